pub mod orchestrator;

pub use orchestrator::StudioService;
