//! Delegated-execution sampling: instead of this process issuing one
//! command per tick, a single long-running command is launched on the
//! remote host in the background and written to a file, which this
//! side polls for and then reads once.
//!
//! QNX's `hogs` is the motivating case (§4.4): `hogs -i 1 -s <interval>`
//! already runs its own sampling loop remotely, so there is nothing to
//! poll on a tick cadence here beyond waiting for its output file to
//! show up.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::{Session, Transport};

const READ_RETRY_COUNT: u32 = 3;
const READ_RETRY_SPACING: Duration = Duration::from_secs(1);

/// Launches `command` in the background on the remote host, redirecting
/// its output to a uniquely named scratch file via the classic
/// `( cmd ) > file.tmp && mv file.tmp file &` idiom (the `mv` makes the
/// file's appearance atomic from the reader's perspective), and
/// returns a [`DelegatedJob`] handle for reading it back.
pub async fn launch<T: Transport>(
    session: &Session<T>,
    tmp_dir: &str,
    command: &str,
) -> Result<DelegatedJob, TransportError> {
    let name = Uuid::new_v4().to_string();
    let file = format!("{}/{}.out", tmp_dir.trim_end_matches('/'), name);
    let tmp_file = format!("{file}.tmp");

    let launcher = format!("( {command} ) > \"{tmp_file}\" && mv \"{tmp_file}\" \"{file}\" & echo $!");
    let pid = session.run_command(&launcher, Some(0), None, None).await?;
    session.add_cleanup(file.clone(), vec!["-f".to_string()]);
    session.add_cleanup(tmp_file, vec!["-f".to_string()]);

    Ok(DelegatedJob {
        file,
        background_pid: pid.trim().to_string(),
    })
}

/// A background job launched via [`launch`]. `read` waits for its
/// output file to appear and returns its contents once.
pub struct DelegatedJob {
    pub file: String,
    pub background_pid: String,
}

impl DelegatedJob {
    /// Waits `interval + 0.2s` (the time the remote command itself is
    /// expected to need), then retries presence checks up to
    /// [`READ_RETRY_COUNT`] times, a second apart, before giving up. On
    /// success the remote file is removed as part of the same
    /// round-trip, the way the original's background-job reader deletes
    /// its scratch file once it has the output in hand.
    pub async fn read<T: Transport>(
        &self,
        session: &Session<T>,
        interval: Duration,
    ) -> Result<String, TransportError> {
        sleep(interval + Duration::from_millis(200)).await;

        let mut attempts = 0;
        loop {
            let check_cmd = format!(
                r#"if [ -f "{}" ]; then cat "{}"; rm -f "{}"; else echo __MISSING__; fi"#,
                self.file, self.file, self.file
            );
            let output = session.run_command(&check_cmd, Some(0), None, None).await?;
            if output.trim_end() != "__MISSING__" && !output.trim().is_empty() {
                return Ok(output);
            }
            attempts += 1;
            if attempts >= READ_RETRY_COUNT {
                return Err(TransportError::CommandFailed {
                    command: format!("read delegated output {}", self.file),
                    reason: format!("output file missing after {attempts} retries"),
                });
            }
            debug!(file = %self.file, attempts, "delegated output not ready yet, retrying");
            sleep(READ_RETRY_SPACING).await;
        }
    }
}

#[cfg(test)]
mod tests {
    // Exercised indirectly through the QNX process-wise CPU/memory
    // handler tests against a mock transport, since it needs the full
    // Session/Transport plumbing to be meaningful.
}
