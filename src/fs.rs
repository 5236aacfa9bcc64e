//! Remote filesystem helper: boolean predicates, unique scratch
//! directories, and scoped cleanup (§4.2).

use uuid::Uuid;

use crate::error::{FilesystemError, TransportError};
use crate::transport::{Session, Transport};

/// A thin layer over [`Session::run_command`] exposing boolean file
/// predicates by issuing a conditional test command that prints
/// exactly `True` or `False`.
pub struct RemoteFs<'a, T: Transport> {
    session: &'a Session<T>,
    tmp_root: String,
}

impl<'a, T: Transport> RemoteFs<'a, T> {
    pub fn new(session: &'a Session<T>, tmp_root: String) -> Self {
        Self { session, tmp_root }
    }

    async fn test_predicate(&self, test_flag: &str, path: &str) -> Result<bool, FilesystemError> {
        let cmd = format!(r#"if [ {test_flag} "{path}" ]; then echo True; else echo False; fi"#);
        let output = self.session.run_command(&cmd, None, None, None).await?;
        match output.trim() {
            "True" => Ok(true),
            "False" => Ok(false),
            other => Err(FilesystemError::AmbiguousPredicate {
                path: path.to_string(),
                raw: other.to_string(),
            }),
        }
    }

    pub async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        Ok(self.test_predicate("-e", path).await.map_err(to_transport_error)?)
    }

    pub async fn is_file(&self, path: &str) -> Result<bool, TransportError> {
        Ok(self.test_predicate("-f", path).await.map_err(to_transport_error)?)
    }

    pub async fn is_directory(&self, path: &str) -> Result<bool, TransportError> {
        Ok(self.test_predicate("-d", path).await.map_err(to_transport_error)?)
    }

    pub async fn has_read_permissions(&self, path: &str) -> Result<bool, TransportError> {
        Ok(self.test_predicate("-r", path).await.map_err(to_transport_error)?)
    }

    pub async fn has_write_permissions(&self, path: &str) -> Result<bool, TransportError> {
        Ok(self.test_predicate("-w", path).await.map_err(to_transport_error)?)
    }

    /// Removes a file or directory. `force` maps to `rm -rf` instead
    /// of `rm -r`.
    pub async fn unlink(&self, path: &str, force: bool) -> Result<(), FilesystemError> {
        let flags = if force { "-rf" } else { "-r" };
        let cmd = format!(r#"rm {flags} "{path}""#);
        self.session
            .run_command(&cmd, None, None, None)
            .await
            .map_err(|e| FilesystemError::UnlinkFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Creates a unique subdirectory under the configured tmp root,
    /// registers it for cleanup, and returns its path. The caller is
    /// responsible for removing it early if it is not exiting via
    /// [`Session::scoped`].
    pub async fn temporary_directory(&self) -> Result<String, TransportError> {
        let path = format!("{}/{}", self.tmp_root.trim_end_matches('/'), Uuid::new_v4());
        self.session
            .run_command(&format!(r#"mkdir -p "{path}""#), None, None, None)
            .await?;
        self.session.add_cleanup(path.clone(), vec!["-rf".to_string()]);
        Ok(path)
    }
}

fn to_transport_error(e: FilesystemError) -> TransportError {
    match e {
        FilesystemError::Transport(t) => t,
        other => TransportError::CommandFailed {
            command: "predicate check".into(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    // RemoteFs is exercised through the handler-level mock-transport
    // tests in `src/handler`, which cover the predicate/temp-directory
    // round trip against a fully controlled command surface.
}
