pub mod browse;
pub mod entries;
pub mod jobs;
pub mod notebooks;
pub mod reviews;
pub mod search;
pub mod share;
pub mod subscriptions;
