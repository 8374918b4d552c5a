//! consultboard-web - HTTP API for consultboard using Axum

pub mod api;
pub mod error;
pub mod router;
pub mod sse;
pub mod user;

pub use error::ApiError;
pub use router::create_router;
pub use user::{ActingUser, USER_HEADER};

use anyhow::Result;
use consultboard_core::DataStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Run the web server
pub async fn run(store: Arc<DataStore>, bind: &str, port: u16) -> Result<()> {
    let router = create_router(store);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Web server listening on http://{}", addr);
    println!("Web server listening on http://{}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
