pub mod companies;
pub mod feeds;
pub mod jobs;
pub mod partitions;
pub mod sources;
pub mod tags;
