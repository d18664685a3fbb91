//! Per-test session fixtures with guaranteed teardown.
//!
//! [`TwoUsers`] brings up an administrator session and a second, ordinary
//! user session, each authenticated and parked in its own scratch
//! collection. [`ResourceFixture`] adds a test file and a test collection
//! to a session. Both are guards: teardown runs when they are dropped, even
//! if the test failed or panicked. Teardown problems are logged, never
//! raised.

use tracing::{debug, info, warn};

use crate::assertions::{Check, Harness};
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::session::{Session, SessionContext};

/// Name of the data object created by [`ResourceFixture`].
pub const TEST_FILE: &str = "testfile.txt";
/// Name of the collection created by [`ResourceFixture`].
pub const TEST_DIR: &str = "testdir";

/// An administrator and an ordinary user, both logged in.
///
/// The ordinary user is created fresh for each fixture, named after
/// `test_user` plus a random suffix, so fixtures can run in parallel
/// against one grid. Created by [`TwoUsers::up`]; torn down by
/// [`TwoUsers::down`] or on drop.
pub struct TwoUsers {
    config: HarnessConfig,
    harness: Harness,
    admin: Session,
    user: Session,
    user_created: bool,
    torn_down: bool,
}

impl TwoUsers {
    /// Authenticate the admin, create and authenticate the test user, and
    /// move both into fresh session collections.
    ///
    /// If any step fails, whatever was already set up is torn down before
    /// the error is returned.
    pub fn up(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let admin = Session::from_config(config, &config.admin_user)?;
        let user = Session::from_config(config, &unique_user_name(&config.test_user))?;
        let mut fixture = Self {
            config: config.clone(),
            harness: Harness::from_config(config),
            admin,
            user,
            user_created: false,
            torn_down: false,
        };
        // Dropping `fixture` on an early return runs the teardown.
        fixture.setup()?;
        info!(
            admin = fixture.admin.user_name(),
            user = fixture.user.user_name(),
            "two-user fixture up"
        );
        Ok(fixture)
    }

    fn setup(&mut self) -> Result<(), HarnessError> {
        let h = &self.harness;
        let c = &self.config;
        let user_name = self.user.user_name();

        login(h, &self.admin, &c.admin_password)?;
        h.assert_icmd(&self.admin, &format!("iadmin mkuser {user_name} rodsuser"), Check::Any)
            .map_err(|e| fixture_error("create test user", e))?;
        self.user_created = true;
        h.assert_icmd(
            &self.admin,
            &format!("iadmin moduser {user_name} password {}", c.test_password),
            Check::Any,
        )
        .map_err(|e| fixture_error("set test user password", e))?;
        login(h, &self.user, &c.test_password)?;

        for session in [&self.admin, &self.user] {
            enter_session_collection(h, session)?;
        }
        Ok(())
    }

    /// The administrator session.
    pub fn admin(&self) -> &Session {
        &self.admin
    }

    /// The ordinary user session.
    pub fn user(&self) -> &Session {
        &self.user
    }

    /// The harness configured for this run.
    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Tear down now instead of on drop.
    pub fn down(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let h = &self.harness;

        cleanup_session(h, &self.user);
        cleanup_session(h, &self.admin);
        if self.user_created {
            best_effort(h, &self.admin, &format!("iadmin rmuser {}", self.user.user_name()));
        }
        best_effort(h, &self.user, "iexit full");
        best_effort(h, &self.admin, "iexit full");
        info!("two-user fixture down");
    }
}

impl Drop for TwoUsers {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A test data object and test collection in a session's scratch collection.
pub struct ResourceFixture<'a> {
    session: &'a Session,
    harness: Harness,
    torn_down: bool,
}

impl<'a> ResourceFixture<'a> {
    /// Upload [`TEST_FILE`] and create [`TEST_DIR`] under the session
    /// collection of `session`.
    pub fn up(session: &'a Session, harness: &Harness) -> Result<Self, HarnessError> {
        let fixture = Self {
            session,
            harness: harness.clone(),
            torn_down: false,
        };
        let contents = format!("I AM A TESTFILE -- [{TEST_FILE}]\n");
        let local = session.write_local_file(TEST_FILE, contents.as_bytes())?;

        let put = format!("iput {} {}", local.display(), fixture.testfile_path());
        fixture
            .harness
            .assert_icmd(session, &put, Check::Any)
            .map_err(|e| fixture_error("upload test file", e))?;
        fixture
            .harness
            .assert_icmd(session, &format!("imkdir {}", fixture.testdir_path()), Check::Any)
            .map_err(|e| fixture_error("create test collection", e))?;
        debug!(session = session.session_id(), "resource fixture up");
        Ok(fixture)
    }

    /// Relative name of the test data object.
    pub fn testfile(&self) -> &'static str {
        TEST_FILE
    }

    /// Relative name of the test collection.
    pub fn testdir(&self) -> &'static str {
        TEST_DIR
    }

    /// Absolute logical path of the test data object.
    pub fn testfile_path(&self) -> String {
        format!("{}/{TEST_FILE}", self.session.session_collection())
    }

    /// Absolute logical path of the test collection.
    pub fn testdir_path(&self) -> String {
        format!("{}/{TEST_DIR}", self.session.session_collection())
    }

    /// Tear down now instead of on drop.
    pub fn down(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        best_effort(&self.harness, self.session, &format!("irm -f {}", self.testfile_path()));
        best_effort(&self.harness, self.session, &format!("irm -rf {}", self.testdir_path()));
        best_effort(&self.harness, self.session, "irmtrash");
        debug!(session = self.session.session_id(), "resource fixture down");
    }
}

impl Drop for ResourceFixture<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// `base` plus a short random suffix, e.g. `alice-1a2b3c4d`.
pub fn unique_user_name(base: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &suffix[..8])
}

fn login(h: &Harness, session: &Session, password: &str) -> Result<(), HarnessError> {
    h.assert_icmd_stdin(session, "iinit", &format!("{password}\n"), Check::Any)
        .map(drop)
        .map_err(|e| fixture_error(&format!("iinit as {}", session.user_name()), e))
}

fn enter_session_collection(h: &Harness, session: &Session) -> Result<(), HarnessError> {
    let collection = session.session_collection();
    h.assert_icmd(session, &format!("imkdir {collection}"), Check::Any)
        .map_err(|e| fixture_error("create session collection", e))?;
    h.assert_icmd(session, &format!("icd {collection}"), Check::Any)
        .map_err(|e| fixture_error("enter session collection", e))?;
    Ok(())
}

fn cleanup_session(h: &Harness, session: &Session) {
    best_effort(h, session, "icd");
    best_effort(h, session, &format!("irm -rf {}", session.session_collection()));
    best_effort(h, session, "irmtrash");
}

/// Run a teardown command, logging instead of failing.
fn best_effort(h: &Harness, session: &dyn SessionContext, command_line: &str) {
    if let Err(e) = h.assert_icmd(session, command_line, Check::Any) {
        warn!(command = command_line, error = %e, "teardown command failed");
    }
}

fn fixture_error(step: &str, e: HarnessError) -> HarnessError {
    match e {
        HarnessError::AssertionMismatch { diagnostic } => {
            HarnessError::Fixture(format!("{step} failed:\n{diagnostic}"))
        }
        other => other,
    }
}
