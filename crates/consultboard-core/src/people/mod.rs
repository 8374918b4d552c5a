//! Consultant profiles and similarity

pub mod similarity;

pub use similarity::{
    consultant_cumulated_experience, predict_similar_consultant, ExperienceFeatures,
    SimilarityModel, NEIGHBOURS,
};
