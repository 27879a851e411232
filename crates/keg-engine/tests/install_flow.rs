use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use keg_build::TestOutcome;
use keg_core::{
    BuildStep, Catalog, Digest, DigestAlgorithm, Formula, InstallDirective, KegError, MatchKind,
    TestStep,
};
use keg_engine::{Engine, EngineConfig};
use keg_fetch::FileTransport;
use sha2::{Digest as _, Sha256};
use tempfile::{tempdir, TempDir};
use zip::write::FileOptions;

struct Fixture {
    source: TempDir,
    prefix: TempDir,
    cache: TempDir,
    counter: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let source = tempdir().expect("source");
        let counter = source.path().join("build-counter");
        Self {
            source,
            prefix: tempdir().expect("prefix"),
            cache: tempdir().expect("cache"),
            counter,
        }
    }

    /// Writes `<name>-<version>.zip` into the source dir, returning its digest.
    fn seed_zip(&self, name: &str, version: &str) -> Digest {
        let path = self.source.path().join(format!("{name}-{version}.zip"));
        let file = File::create(&path).expect("create zip");
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("seed.txt", FileOptions::default()).expect("entry");
        zip.write_all(format!("{name} {version}\n").as_bytes())
            .expect("write");
        zip.finish().expect("finish");
        let bytes = fs::read(&path).expect("read back");
        Digest {
            algorithm: DigestAlgorithm::Sha256,
            value: hex::encode(Sha256::digest(&bytes)),
        }
    }

    fn engine(&self, catalog: Catalog) -> Engine {
        Engine::new(
            catalog,
            Box::new(FileTransport::new(self.source.path())),
            self.prefix.path(),
            self.cache.path(),
            EngineConfig {
                step_timeout: Duration::from_secs(30),
                fetch_attempts: 2,
                fetch_base_delay: Duration::from_millis(1),
            },
        )
    }

    fn build_log(&self) -> Vec<String> {
        match fs::read_to_string(&self.counter) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn registry_bytes(&self) -> Vec<u8> {
        fs::read(self.prefix.path().join("registry.json")).expect("registry file")
    }
}

#[allow(clippy::too_many_arguments)]
fn formula(
    fixture: &Fixture,
    name: &str,
    version: &str,
    digest: Digest,
    deps: &[&str],
    payload: &str,
    install_dest: &str,
    test: Vec<TestStep>,
) -> Formula {
    let script = format!(
        "echo {payload} > out.txt && echo {name} >> {}",
        fixture.counter.display()
    );
    Formula {
        name: name.to_string(),
        description: format!("fixture formula {name}"),
        homepage: String::new(),
        version: version.to_string(),
        url: format!("file:{name}-{version}.zip"),
        digest,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        build: vec![BuildStep {
            argv: vec!["sh".to_string(), "-c".to_string(), script],
        }],
        install: vec![InstallDirective {
            source: "out.txt".to_string(),
            dest: install_dest.to_string(),
        }],
        test,
    }
}

fn contains_test(path: &str, expect: &str) -> Vec<TestStep> {
    vec![TestStep {
        argv: vec!["cat".to_string(), path.to_string()],
        expect: Some(expect.to_string()),
        match_kind: MatchKind::Contains,
    }]
}

#[test]
fn dependency_is_built_exactly_once_before_the_dependent() {
    let fixture = Fixture::new();
    let alpha_digest = fixture.seed_zip("alpha", "1.0.0");
    let beta_digest = fixture.seed_zip("beta", "1.0.0");
    let catalog = Catalog::from_formulas([
        formula(&fixture, "alpha", "1.0.0", alpha_digest, &[], "1.0.0", "share/alpha/version", Vec::new()),
        formula(&fixture, "beta", "1.0.0", beta_digest, &["alpha"], "beta-payload", "share/beta/payload", Vec::new()),
    ])
    .expect("catalog");
    let engine = fixture.engine(catalog);
    let report = engine.install("beta").expect("install");
    assert_eq!(report.built, vec!["alpha", "beta"]);
    assert!(report.skipped.is_empty());
    assert_eq!(fixture.build_log(), vec!["alpha", "beta"]);
    assert!(engine.registry().lookup("alpha").expect("lookup").is_some());
    assert!(engine.registry().lookup("beta").expect("lookup").is_some());
}

#[test]
fn reinstall_is_idempotent() {
    let fixture = Fixture::new();
    let digest = fixture.seed_zip("alpha", "1.0.0");
    let catalog = Catalog::from_formulas([formula(
        &fixture,
        "alpha",
        "1.0.0",
        digest,
        &[],
        "1.0.0",
        "share/alpha/version",
        contains_test("share/alpha/version", "1.0.0"),
    )])
    .expect("catalog");
    let engine = fixture.engine(catalog);
    engine.install("alpha").expect("first install");
    let snapshot = fixture.registry_bytes();
    let report = engine.install("alpha").expect("second install");
    assert_eq!(report.skipped, vec!["alpha"]);
    assert!(report.built.is_empty());
    assert_eq!(fixture.build_log(), vec!["alpha"], "no second build");
    assert_eq!(fixture.registry_bytes(), snapshot, "registry byte-identical");
}

#[test]
fn passing_verification_marks_the_entry_verified() {
    let fixture = Fixture::new();
    let digest = fixture.seed_zip("alpha", "1.0.0");
    let catalog = Catalog::from_formulas([formula(
        &fixture,
        "alpha",
        "1.0.0",
        digest,
        &[],
        "1.0.0",
        "share/alpha/version",
        contains_test("share/alpha/version", "1.0.0"),
    )])
    .expect("catalog");
    let engine = fixture.engine(catalog);
    let report = engine.install("alpha").expect("install");
    assert_eq!(report.verification, Some(TestOutcome::Passed));
    let entry = engine.registry().lookup("alpha").expect("lookup").expect("entry");
    assert!(entry.verified);
}

#[test]
fn failing_verification_leaves_the_package_installed_but_unverified() {
    let fixture = Fixture::new();
    let digest = fixture.seed_zip("gamma", "1.0.0");
    let test = vec![TestStep {
        argv: vec!["cat".to_string(), "share/gamma/version".to_string()],
        expect: Some("1.0.0".to_string()),
        match_kind: MatchKind::Equals,
    }];
    // The build writes 1.0.1, so the equals-match against 1.0.0 must fail.
    let catalog = Catalog::from_formulas([formula(
        &fixture,
        "gamma",
        "1.0.0",
        digest,
        &[],
        "1.0.1",
        "share/gamma/version",
        test,
    )])
    .expect("catalog");
    let engine = fixture.engine(catalog);
    let report = engine.install("gamma").expect("install succeeds regardless");
    match &report.verification {
        Some(TestOutcome::Failed { step, reason }) => {
            assert_eq!(*step, 0);
            assert!(reason.contains("mismatch"), "reason was: {reason}");
        }
        other => panic!("expected failed verification, got {other:?}"),
    }
    let entry = engine.registry().lookup("gamma").expect("lookup").expect("still installed");
    assert!(!entry.verified);
    assert!(fixture.prefix.path().join("share/gamma/version").exists());
}

#[test]
fn upgrade_replaces_the_entry_and_removes_old_files() {
    let fixture = Fixture::new();
    let v1 = fixture.seed_zip("alpha", "1.0.0");
    let catalog_v1 = Catalog::from_formulas([formula(
        &fixture, "alpha", "1.0.0", v1, &[], "one", "share/alpha/one.txt", Vec::new(),
    )])
    .expect("catalog v1");
    fixture.engine(catalog_v1).install("alpha").expect("install v1");
    assert!(fixture.prefix.path().join("share/alpha/one.txt").exists());

    let v2 = fixture.seed_zip("alpha", "2.0.0");
    let catalog_v2 = Catalog::from_formulas([formula(
        &fixture, "alpha", "2.0.0", v2, &[], "two", "share/alpha/two.txt", Vec::new(),
    )])
    .expect("catalog v2");
    let engine = fixture.engine(catalog_v2);
    let report = engine.install("alpha").expect("install v2");
    assert_eq!(report.built, vec!["alpha"]);
    assert!(!fixture.prefix.path().join("share/alpha/one.txt").exists());
    assert!(fixture.prefix.path().join("share/alpha/two.txt").exists());
    let entry = engine.registry().lookup("alpha").expect("lookup").expect("entry");
    assert_eq!(entry.version, "2.0.0");
}

#[test]
fn failed_build_records_nothing() {
    let fixture = Fixture::new();
    let digest = fixture.seed_zip("delta", "1.0.0");
    let mut delta = formula(
        &fixture, "delta", "1.0.0", digest, &[], "unused", "share/delta/out", Vec::new(),
    );
    delta.build = vec![BuildStep {
        argv: vec!["sh".to_string(), "-c".to_string(), "exit 7".to_string()],
    }];
    let catalog = Catalog::from_formulas([delta]).expect("catalog");
    let engine = fixture.engine(catalog);
    let err = engine.install("delta").expect_err("build must fail");
    assert!(matches!(err, KegError::BuildStepFailed(_)));
    assert!(engine.registry().lookup("delta").expect("lookup").is_none());
}

#[test]
fn corrupted_artifact_aborts_the_install() {
    let fixture = Fixture::new();
    let mut digest = fixture.seed_zip("alpha", "1.0.0");
    // Claim a different digest than the seeded archive actually has.
    digest.value = "cd".repeat(32);
    let catalog = Catalog::from_formulas([formula(
        &fixture, "alpha", "1.0.0", digest, &[], "1.0.0", "share/alpha/version", Vec::new(),
    )])
    .expect("catalog");
    let engine = fixture.engine(catalog);
    let err = engine.install("alpha").expect_err("must abort");
    assert!(matches!(err, KegError::IntegrityMismatch(_)));
    assert!(engine.registry().lookup("alpha").expect("lookup").is_none());
    assert_eq!(fixture.build_log(), Vec::<String>::new(), "no build ran");
}

#[test]
fn uninstall_removes_files_and_entry() {
    let fixture = Fixture::new();
    let digest = fixture.seed_zip("alpha", "1.0.0");
    let catalog = Catalog::from_formulas([formula(
        &fixture, "alpha", "1.0.0", digest, &[], "1.0.0", "share/alpha/version", Vec::new(),
    )])
    .expect("catalog");
    let engine = fixture.engine(catalog);
    engine.install("alpha").expect("install");
    engine.uninstall("alpha").expect("uninstall");
    assert!(!fixture.prefix.path().join("share/alpha/version").exists());
    assert!(engine.registry().lookup("alpha").expect("lookup").is_none());
}

#[test]
fn test_command_requires_an_installed_formula() {
    let fixture = Fixture::new();
    let digest = fixture.seed_zip("alpha", "1.0.0");
    let catalog = Catalog::from_formulas([formula(
        &fixture,
        "alpha",
        "1.0.0",
        digest,
        &[],
        "1.0.0",
        "share/alpha/version",
        contains_test("share/alpha/version", "1.0.0"),
    )])
    .expect("catalog");
    let engine = fixture.engine(catalog);
    let err = engine.test("alpha").expect_err("not installed yet");
    assert_eq!(err.info().code, "keg_engine.not_installed");
    engine.install("alpha").expect("install");
    assert_eq!(engine.test("alpha").expect("test"), TestOutcome::Passed);
}
