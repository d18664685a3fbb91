//! Session contexts that commands run under.
//!
//! A session is an authenticated identity in a zone plus the local
//! environment the icommands read their connection settings from. The
//! harness only reads sessions; creating and tearing them down is the job
//! of the [`fixtures`](crate::fixtures).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::HarnessError;

/// Environment variable the icommands read their environment file from.
pub const ENV_FILE_VAR: &str = "irodsEnvFile";
/// Environment variable naming the scrambled password file.
pub const AUTH_FILE_VAR: &str = "irodsAuthFileName";

/// The contract the runner consumes to place a command in a session.
pub trait SessionContext {
    fn user_name(&self) -> &str;
    fn zone_name(&self) -> &str;
    fn session_id(&self) -> &str;

    /// Local directory the child process runs in.
    fn working_dir(&self) -> &Path;

    /// Variables added to the inherited environment of every command.
    fn env(&self) -> Vec<(OsString, OsString)>;

    /// `/<zone>/home/<user>`.
    fn home_collection(&self) -> String {
        format!("/{}/home/{}", self.zone_name(), self.user_name())
    }

    /// `/<zone>/home/<user>/<session_id>`, the per-session scratch collection.
    fn session_collection(&self) -> String {
        format!("{}/{}", self.home_collection(), self.session_id())
    }
}

/// A session backed by a private directory holding its environment file.
///
/// The directory is removed when the session is dropped.
#[derive(Debug)]
pub struct Session {
    user_name: String,
    zone_name: String,
    session_id: String,
    dir: TempDir,
    extra_env: Vec<(OsString, OsString)>,
    bin_dir: Option<PathBuf>,
}

impl Session {
    /// Start building a session for `user_name` in `zone_name`.
    pub fn builder(user_name: impl Into<String>, zone_name: impl Into<String>) -> SessionBuilder {
        SessionBuilder {
            user_name: user_name.into(),
            zone_name: zone_name.into(),
            session_id: None,
            host: "localhost".into(),
            port: 1247,
            default_resource: None,
            bin_dir: None,
            extra_env: Vec::new(),
        }
    }

    /// Build a session for `user_name` using the connection settings in `config`.
    pub fn from_config(config: &HarnessConfig, user_name: &str) -> Result<Self, HarnessError> {
        let mut builder = Session::builder(user_name, &config.zone)
            .host(&config.host)
            .port(config.port)
            .default_resource(&config.default_resource);
        if let Some(dir) = &config.bin_dir {
            builder = builder.bin_dir(dir.clone());
        }
        builder.build()
    }

    /// Path of the environment file the icommands read.
    pub fn env_file(&self) -> PathBuf {
        self.dir.path().join(".irodsEnv")
    }

    /// Path of the authentication file `iinit` writes.
    pub fn auth_file(&self) -> PathBuf {
        self.dir.path().join(".irodsA")
    }

    /// Create a local file inside the session directory.
    pub fn write_local_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf, HarnessError> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

impl SessionContext for Session {
    fn user_name(&self) -> &str {
        &self.user_name
    }

    fn zone_name(&self) -> &str {
        &self.zone_name
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn working_dir(&self) -> &Path {
        self.dir.path()
    }

    fn env(&self) -> Vec<(OsString, OsString)> {
        let mut env = vec![
            (ENV_FILE_VAR.into(), self.env_file().into_os_string()),
            (AUTH_FILE_VAR.into(), self.auth_file().into_os_string()),
        ];
        if let Some(bin_dir) = &self.bin_dir {
            let mut paths = vec![bin_dir.clone()];
            if let Some(existing) = std::env::var_os("PATH") {
                paths.extend(std::env::split_paths(&existing));
            }
            if let Ok(joined) = std::env::join_paths(paths) {
                env.push(("PATH".into(), joined));
            }
        }
        env.extend(self.extra_env.iter().cloned());
        env
    }
}

/// Builder for [`Session`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    user_name: String,
    zone_name: String,
    session_id: Option<String>,
    host: String,
    port: u16,
    default_resource: Option<String>,
    bin_dir: Option<PathBuf>,
    extra_env: Vec<(OsString, OsString)>,
}

impl SessionBuilder {
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn default_resource(mut self, resource: impl Into<String>) -> Self {
        self.default_resource = Some(resource.into());
        self
    }

    /// Prepend a directory to `PATH` for every command.
    #[must_use]
    pub fn bin_dir(mut self, dir: PathBuf) -> Self {
        self.bin_dir = Some(dir);
        self
    }

    /// Add an extra environment variable for every command.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Create the session directory and write its environment file.
    pub fn build(self) -> Result<Session, HarnessError> {
        validate_name("user name", &self.user_name)?;
        validate_name("zone name", &self.zone_name)?;
        let session_id = match self.session_id {
            Some(id) => {
                validate_name("session id", &id)?;
                id
            }
            None => generate_session_id(),
        };

        let dir = tempfile::Builder::new()
            .prefix(&format!("icmd-{}-", self.user_name))
            .tempdir()?;

        let session = Session {
            user_name: self.user_name,
            zone_name: self.zone_name,
            session_id,
            dir,
            extra_env: self.extra_env,
            bin_dir: self.bin_dir,
        };

        let home = session.home_collection();
        let mut lines = vec![
            format!("irodsHost '{}'", self.host),
            format!("irodsPort {}", self.port),
            format!("irodsUserName '{}'", session.user_name),
            format!("irodsZone '{}'", session.zone_name),
            format!("irodsHome '{home}'"),
            format!("irodsCwd '{home}'"),
        ];
        if let Some(resource) = &self.default_resource {
            lines.push(format!("irodsDefResource '{resource}'"));
        }
        let mut contents = lines.join("\n");
        contents.push('\n');
        std::fs::write(session.env_file(), contents)?;

        debug!(
            user = %session.user_name,
            zone = %session.zone_name,
            session_id = %session.session_id,
            dir = %session.dir.path().display(),
            "session created"
        );
        Ok(session)
    }
}

/// Generate a unique, collection-safe session identifier.
pub fn generate_session_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("session-{stamp}-{}", &suffix[..8])
}

fn validate_name(what: &str, value: &str) -> Result<(), HarnessError> {
    if value.is_empty() || value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(HarnessError::Fixture(format!(
            "{what} must be non-empty with no '/' or whitespace, got {value:?}"
        )));
    }
    Ok(())
}
