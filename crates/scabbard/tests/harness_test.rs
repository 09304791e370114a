//! End-to-end tests for the harness.
//!
//! The tests in the first half run anywhere. The second half drives the
//! real `pack` CLI and Docker daemon and is ignored by default:
//!
//! ```text
//! cargo test -p scabbard -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use scabbard::leak::{ImageDiff, LeakCheck};
use scabbard::{App, BuildpackRef, Error, LocalBuildpack, PackBuild, PackConfig, ScabbardConfig,
    ScabbardError};
use serial_test::serial;

fn io_error(path: &str, source: std::io::Error) -> Error {
    Error::Common(ScabbardError::Io {
        path: PathBuf::from(path),
        source,
    })
}

fn fixture_source() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("cat"), b"meow").expect("write");
    dir
}

#[test]
#[serial]
fn transaction_directory_is_gone_after_success_and_failure() {
    let source = fixture_source();

    let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());
    let mut seen_dir = PathBuf::new();
    app.transaction(|app| {
        seen_dir = app.app_dir()?.to_path_buf();
        Ok(())
    })
    .expect("transaction");
    assert!(!seen_dir.exists());

    let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());
    let mut seen_dir = PathBuf::new();
    let _ = app
        .transaction(|app| {
            seen_dir = app.app_dir()?.to_path_buf();
            Err::<(), _>(Error::Common(ScabbardError::Usage {
                message: "deliberate".into(),
            }))
        })
        .expect_err("body error should surface");
    assert!(!seen_dir.exists());
}

#[test]
#[serial]
fn spawned_work_is_joined_before_the_transaction_returns() {
    let source = fixture_source();
    let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());

    let sentinel = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&sentinel);
    app.transaction(move |app| {
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            observed.store(true, Ordering::SeqCst);
        });
        app.on_teardown(move || {
            handle.join().map_err(|_| {
                Error::TaskPanicked {
                    message: "background task panicked".into(),
                }
            })
        });
        Ok(())
    })
    .expect("transaction");

    assert!(
        sentinel.load(Ordering::SeqCst),
        "the spawned task must finish before teardown completes"
    );
}

#[test]
#[serial]
fn teardown_actions_run_in_reverse_order_across_a_transaction() {
    let source = fixture_source();
    let mut app = App::new(source.path().to_string_lossy(), ScabbardConfig::default());

    let animals = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = Arc::clone(&animals);
    app.transaction(move |app| {
        let dogs = Arc::clone(&seen);
        app.on_teardown(move || {
            dogs.lock().expect("lock").push("dog");
            Ok(())
        });
        let cats = Arc::clone(&seen);
        app.on_teardown(move || {
            cats.lock().expect("lock").push("cat");
            Ok(())
        });
        assert!(seen.lock().expect("lock").is_empty());
        Ok(())
    })
    .expect("transaction");

    assert_eq!(*animals.lock().expect("lock"), vec!["cat", "dog"]);
}

// ── Docker-backed scenarios ──────────────────────────────────────────

fn stub_buildpack_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("package.toml"),
        "[buildpack]\nuri = \".\"\n",
    )
    .expect("write package.toml");
    std::fs::write(
        dir.path().join("buildpack.toml"),
        r#"api = "0.10"

[buildpack]
id = "scabbard/stub"
version = "0.0.1"

[[stacks]]
id = "*"
"#,
    )
    .expect("write buildpack.toml");

    let bin = dir.path().join("bin");
    std::fs::create_dir(&bin).expect("mkdir bin");
    for script in ["detect", "build"] {
        let path = bin.join(script);
        std::fs::write(&path, "#!/usr/bin/env bash\n\nexit 0\n").expect("write script");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod");
        }
    }
    dir
}

#[test]
#[ignore = "requires Docker and the pack CLI"]
fn pack_build_produces_and_tears_down_an_image() -> anyhow::Result<()> {
    let docker = scabbard::DockerClient::connect()?;
    let buildpack_dir = stub_buildpack_dir();
    let buildpack = Arc::new(LocalBuildpack::new(buildpack_dir.path()));

    let app_dir = tempfile::tempdir()?;
    let before = ImageDiff::capture(&docker)?;

    let mut build = PackBuild::new(PackConfig {
        app_dir: app_dir.path().to_path_buf(),
        image_name: format!("scabbard_image_e2e_{}", std::process::id()),
        builder: Some("heroku/builder:24".to_string()),
        buildpacks: vec![BuildpackRef::from(Arc::clone(&buildpack))],
        env: std::collections::BTreeMap::new(),
    })?;

    let outcome = build.call(&docker);
    if outcome.is_err() {
        let _ = build.teardown(&docker);
        let _ = buildpack.teardown(&docker);
    }
    let result = outcome?;

    assert!(result.stdout.contains("Successfully built image"));
    assert!(build.success()?);
    assert!(build.image_handle().is_some());
    assert!(before.diff(&docker)?.changed());

    build.teardown(&docker)?;
    buildpack.teardown(&docker)?;
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires Docker and the pack CLI"]
fn full_fixture_lifecycle_builds_runs_and_boots() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let docker = Arc::new(scabbard::DockerClient::connect()?);
    let config = ScabbardConfig::default();
    let snapshot = LeakCheck::record(&docker, &config)?;

    let source = tempfile::tempdir()?;
    let run_multi_observed = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&run_multi_observed);

    let mut app = App::new(source.path().to_string_lossy(), config)
        .with_builder("heroku/builder:24")
        .with_buildpacks(vec![
            BuildpackRef::from("heroku/ruby"),
            BuildpackRef::from("heroku/procfile"),
        ])
        .with_docker(Arc::clone(&docker));

    app.transaction(move |app| {
        let app_dir = app.app_dir()?.to_path_buf();
        std::fs::write(app_dir.join("Gemfile"), "").map_err(|e| io_error("Gemfile", e))?;
        std::fs::write(
            app_dir.join("Gemfile.lock"),
            "GEM\n  specs:\n\nPLATFORMS\n  ruby\n  x86_64-linux\n\nDEPENDENCIES\n",
        )
        .map_err(|e| io_error("Gemfile.lock", e))?;
        // The entrypoint must not exit for the container boot below.
        std::fs::write(
            app_dir.join("Procfile"),
            "web: touch started && tail -f started\n",
        )
        .map_err(|e| io_error("Procfile", e))?;

        let build = app.pack_build()?;
        assert!(build.stdout()?.contains("Successfully built image"));
        assert!(app.stdout()?.contains("Successfully built image"));

        let result = app.run("pwd")?;
        assert!(result.stdout.contains("/workspace"));

        app.run_multi("pwd", move |result| {
            observed.store(true, Ordering::SeqCst);
            assert!(result.stdout.contains("/workspace"));
        });

        let mut seen_container = String::new();
        app.start_container(&[], |container| {
            seen_container = container.id().to_string();
            let listing = container.bash_exec("ls /workspace")?;
            assert!(listing.stdout.contains("Gemfile"));
            assert!(container.contains_file("/workspace/Gemfile")?);
            Ok(())
        })?;

        let docker = Arc::clone(app.docker()?);
        assert!(!docker.container_exists(&seen_container).map_err(Error::from)?);
        Ok(())
    })?;

    assert!(run_multi_observed.load(Ordering::SeqCst));
    // pack pulls builder and run images into the daemon, so only the
    // environment is checked here; image checking has its own test below.
    snapshot.check_with(&docker, false)?;
    Ok(())
}

#[test]
#[ignore = "requires Docker"]
fn leak_snapshot_round_trip_reports_no_drift() -> anyhow::Result<()> {
    let docker = scabbard::DockerClient::connect()?;
    let config = ScabbardConfig::default();

    let snapshot = LeakCheck::record(&docker, &config)?;
    snapshot.check_with(&docker, true)?;
    Ok(())
}
