pub mod candidate_sets;
pub mod catalog;
pub mod lineup;
pub mod metrics_store;
pub mod qa;
pub mod slate;
pub mod topics;

pub use candidate_sets::CandidateSetStore;
pub use catalog::ExperimentCatalog;
pub use lineup::{dedupe_recommendations, LineupAssembler, LineupService};
pub use metrics_store::{MetricsBatch, MetricsStore};
pub use qa::QaOverrides;
pub use slate::SlateAssembler;
pub use topics::{StoreTopicProfiles, TopicProfileProvider};
