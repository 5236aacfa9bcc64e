//! Remote performance telemetry: connect to a Linux, Android or QNX
//! host over SSH or ADB, run the OS-appropriate command recipes, and
//! get back typed CPU/memory/disk/network/pressure records, either as
//! one-shot reads or as periodic background measurements.

pub mod error;
pub mod fs;
pub mod handler;
pub mod parse;
pub mod record;
pub mod sampler;
pub mod transport;

pub use error::{CapabilityMissingError, FilesystemError, HandlerError, ParsingError, SamplerError, TransportError};
pub use fs::RemoteFs;
pub use handler::android::AndroidHandler;
pub use handler::linux::LinuxHandler;
pub use handler::qnx::QnxHandler;
pub use transport::adb::AdbTransport;
pub use transport::ssh::{SshAuth, SshTransport};
pub use transport::{Session, Transport, TransportConfig};
