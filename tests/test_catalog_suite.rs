//! Catalog tests for the navigation, help, mkdir and query icommands.
//!
//! Every test runs against a live grid: an admin and a test user are
//! created and logged in, and a test file and test collection are placed in
//! the admin's session collection. All tests are ignored by default.
//! Point the harness at a grid with `ICMD_HOST`, `ICMD_ZONE` and friends,
//! then run:
//!   cargo test -p icmd-tests --test test_catalog_suite -- --ignored

mod common;

use icmd_harness::{Check, HarnessError, ResourceFixture, SessionContext, TwoUsers};

/// Bring up both users and the resource fixture, run `body`, tear down.
fn with_catalog<F>(body: F) -> Result<(), HarnessError>
where
    F: FnOnce(&TwoUsers, &ResourceFixture<'_>) -> Result<(), HarnessError>,
{
    let config = common::live_config();
    let users = TwoUsers::up(&config)?;
    let resource = ResourceFixture::up(users.admin(), users.harness())?;
    body(&users, &resource)
}

fn home_listing(users: &TwoUsers) -> String {
    let admin = users.admin();
    format!("{}:", admin.home_collection())
}

// ---------------------------------------------------------------------------
// icd
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires a running iRODS grid
fn test_empty_icd() -> Result<(), HarnessError> {
    with_catalog(|users, resource| {
        let h = users.harness();
        let admin = users.admin();
        h.assert_icmd(admin, "ils -L", Check::list("test"))?;
        h.assert_icmd(admin, &format!("icd {}", resource.testdir()), Check::Any)?;
        h.assert_icmd(admin, "icd", Check::Any)?;
        h.assert_icmd(admin, "ils", Check::list(home_listing(users)))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_empty_icd_verbose() -> Result<(), HarnessError> {
    with_catalog(|users, resource| {
        let h = users.harness();
        let admin = users.admin();
        h.assert_icmd(admin, &format!("icd {}", resource.testdir()), Check::Any)?;
        h.assert_icmd(
            admin,
            "icd -v",
            Check::list("Deleting (if it exists) session envFile:"),
        )?;
        h.assert_icmd(admin, "ils", Check::list(home_listing(users)))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_icd_to_subdir() -> Result<(), HarnessError> {
    with_catalog(|users, resource| {
        let h = users.harness();
        let admin = users.admin();
        h.assert_icmd(admin, &format!("icd {}", resource.testdir()), Check::Any)?;
        h.assert_icmd(admin, "ils", Check::list(format!("{}:", resource.testdir_path())))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_icd_to_parentdir() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let h = users.harness();
        let admin = users.admin();
        h.assert_icmd(admin, "icd ..", Check::Any)?;
        h.assert_icmd(admin, "ils", Check::list(home_listing(users)))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_icd_to_root() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let h = users.harness();
        let admin = users.admin();
        h.assert_icmd(admin, "icd /", Check::Any)?;
        h.assert_icmd(admin, "ils", Check::list("/:"))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_icd_to_root_with_badpath() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd_fail(
            users.admin(),
            "icd /doesnotexist",
            Check::list("No such directory (collection):"),
        )?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// iexit
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires a running iRODS grid
fn test_iexit() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd(users.admin(), "iexit", Check::Any)?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_iexit_verbose() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd(
            users.admin(),
            "iexit -v",
            Check::list("Deleting (if it exists) session envFile:"),
        )?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_iexit_with_bad_option() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd_fail(users.admin(), "iexit -z", Check::Any)?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_iexit_with_bad_parameter() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users
            .harness()
            .assert_icmd_fail(users.admin(), "iexit badparameter", Check::Any)?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// ihelp
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_ihelp() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd(
            users.admin(),
            "ihelp",
            Check::list("The following is a list of the icommands"),
        )?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_ihelp_with_help() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd(
            users.admin(),
            "ihelp -h",
            Check::list("Display i-commands synopsis"),
        )?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_ihelp_all() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users
            .harness()
            .assert_icmd(users.admin(), "ihelp -a", Check::list("Usage"))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_ihelp_with_good_icommand() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users
            .harness()
            .assert_icmd(users.admin(), "ihelp ils", Check::list("Usage"))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_ihelp_with_bad_icommand() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users
            .harness()
            .assert_icmd_fail(users.admin(), "ihelp idoesnotexist", Check::Any)?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_ihelp_with_bad_option() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd_fail(users.admin(), "ihelp -z", Check::Any)?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// imkdir
// ---------------------------------------------------------------------------

/// Not listed, created, then listed.
fn assert_imkdir_creates(
    users: &TwoUsers,
    list_path: &str,
    mkdir_args: &str,
    name: &str,
) -> Result<(), HarnessError> {
    let h = users.harness();
    let admin = users.admin();
    h.assert_icmd_fail(admin, &format!("ils -L {list_path}"), Check::list(name))?;
    h.assert_icmd(admin, &format!("imkdir {mkdir_args}"), Check::Any)?;
    h.assert_icmd(admin, &format!("ils -L {name}"), Check::list(name))?;
    Ok(())
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_imkdir() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let dir = "testingimkdir";
        assert_imkdir_creates(users, dir, dir, dir)
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_imkdir_with_trailing_slash() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let dir = "testingimkdirwithslash";
        let slashed = format!("{dir}/");
        assert_imkdir_creates(users, &slashed, &slashed, dir)
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_imkdir_with_trailing_slash_already_exists() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let h = users.harness();
        let admin = users.admin();
        let dir = "testingimkdirwithslash";
        h.assert_icmd(admin, &format!("imkdir {dir}/"), Check::Any)?;
        h.assert_icmd_fail(admin, &format!("imkdir {dir}"), Check::Any)?;
        h.assert_icmd_fail(admin, &format!("imkdir {dir}/"), Check::Any)?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_imkdir_when_dir_already_exists() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let h = users.harness();
        let admin = users.admin();
        let dir = "testingimkdiralreadyexists";
        h.assert_icmd(admin, &format!("imkdir {dir}"), Check::Any)?;
        h.assert_icmd_fail(admin, &format!("imkdir {dir}"), Check::Any)?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_imkdir_when_file_already_exists() -> Result<(), HarnessError> {
    with_catalog(|users, resource| {
        users.harness().assert_icmd_fail(
            users.admin(),
            &format!("imkdir {}", resource.testfile()),
            Check::Any,
        )?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_imkdir_with_parent() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let dir = "parent/testingimkdirwithparent";
        assert_imkdir_creates(users, dir, &format!("-p {dir}"), dir)
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_local_imkdir_with_bad_option() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd_fail(users.admin(), "imkdir -z", Check::Any)?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// iquest
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires a running iRODS grid
fn test_iquest_totaldatasize() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        let admin = users.admin();
        let query = format!(
            r#"iquest "select sum(DATA_SIZE) where COLL_NAME like '/{}/home/%'""#,
            admin.zone_name()
        );
        users.harness().assert_icmd(admin, &query, Check::list("DATA_SIZE"))?;
        Ok(())
    })
}

#[test]
#[ignore] // Requires a running iRODS grid
fn test_iquest_bad_format() -> Result<(), HarnessError> {
    with_catalog(|users, _| {
        users.harness().assert_icmd(
            users.admin(),
            r#"iquest "bad formatting""#,
            Check::error("INPUT_ARG_NOT_WELL_FORMED_ERR"),
        )?;
        Ok(())
    })
}
