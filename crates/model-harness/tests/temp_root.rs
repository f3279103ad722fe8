//! Process-wide temp root behaviour.
//!
//! Kept in its own test binary: the root is global to the process, so the
//! whole scenario lives in a single test.

use std::sync::Arc;

use model_harness::fakes::FakeConnector;
use model_harness::{
    HarnessConfig, ModelCase, ModelClass, ModelHarness, RepositorySettings, StaticFixtures,
    TempRoot,
};

#[tokio::test]
async fn test_process_wide_root_is_reset_once_and_shared() {
    let base = tempfile::tempdir().unwrap();
    let root_path = base.path().join("gradleTests");

    // stale content from an earlier process
    std::fs::create_dir_all(root_path.join("stale")).unwrap();
    std::fs::write(root_path.join("stale/build.gradle"), "").unwrap();

    let first = TempRoot::process_wide(&root_path).unwrap();
    assert!(first.path().is_dir());
    assert!(!root_path.join("stale").exists());

    // content created after initialisation survives a second lookup
    std::fs::create_dir_all(root_path.join("kept")).unwrap();
    let second = TempRoot::process_wide(&root_path).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(root_path.join("kept").exists());

    // a different path is ignored once the root exists
    let other = TempRoot::process_wide(&base.path().join("elsewhere")).unwrap();
    assert_eq!(other.path(), root_path.as_path());
    assert!(!base.path().join("elsewhere").exists());

    // harnesses built from config share the same root
    let config = HarnessConfig::default()
        .with_repositories(RepositorySettings::offline())
        .with_temp_base(base.path());
    let fixtures = Arc::new(StaticFixtures::new().with_project("testRoot", "", ""));
    let harness =
        ModelHarness::with_connector(&config, Arc::new(FakeConnector::new()), fixtures).unwrap();
    assert_eq!(harness.provisioner().root().path(), root_path.as_path());

    let case = ModelCase::new("testRoot", [ModelClass::EXTERNAL_PROJECT]);
    let run = harness.run_case(&case, "1.9").await;
    assert!(run.passed(), "{:?}", run.failure());
    assert!(root_path.is_dir());
    assert!(!root_path.join("testRoot").exists());
}
