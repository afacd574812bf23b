mod backend;
mod config;
mod error;
mod gpio;
mod wait;

pub use backend::{MockReadiness, PollReadiness};
pub use config::{
    AppConfig, DEFAULT_SYSFS_ROOT, Direction, EdgeDetect, PinConfig, RetryPolicy,
};
pub use error::GpioError;
pub use gpio::{BoxedHandler, EdgeHandler, GpioClass, SysfsPin};
pub use wait::{ReadinessPoller, ResumeHandle, WaitLoop};
