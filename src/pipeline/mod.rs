pub mod driver;
pub mod progress;
pub mod report;

pub use driver::{preview, PipelineDriver};
pub use progress::{LogProgress, ProgressObserver, SilentProgress};
pub use report::{generate_report, RunMode};
