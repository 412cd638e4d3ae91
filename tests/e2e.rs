//! End-to-end scenarios from spec.md §8, driven against `ClientDriver`
//! through the in-memory collaborators in `tests/common`.

mod common;

use std::sync::Arc;

use common::{build_control_document, sample_target, FakeHttpCollaborator, NullProgress, TEST_MUTEX, BLOCK_SIZE};
use tempfile::tempdir;
use zrsync::core::model::ChecksumStatus;
use zrsync::{ClientDriver, ClientError, RunRequest};

fn base_request(control_location: &str) -> RunRequest {
    RunRequest {
        control_location: control_location.to_string(),
        output_override: None,
        seed_paths: Vec::new(),
        referrer: None,
        quiet: true,
        keep_control_path: None,
        rng_seed: 42,
    }
}

/// Scenario 1: cold download — no seeds, no prior output, control document
/// fetched over HTTP. Every candidate range must be fetched; `local_used`
/// is zero and the result is installed under the advisory filename.
#[tokio::test]
async fn cold_download_fetches_everything_and_installs() {
    let _guard = TEST_MUTEX.lock().unwrap();
    let dir = tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let target = sample_target(BLOCK_SIZE as usize * 5 + 3);
    let control = build_control_document(&target, &["http://h/f.bin"], &[], Some("f.bin"));

    let http = Arc::new(
        FakeHttpCollaborator::new()
            .serve("http://h/f.ctrl", control)
            .serve("http://h/f.bin", target.clone()),
    );
    let progress = Arc::new(NullProgress);

    let report = ClientDriver::run(http, progress, base_request("http://h/f.ctrl")).await.unwrap();

    assert_eq!(report.local_used, 0);
    assert!(report.http_bytes_downloaded >= target.len() as u64);
    assert_eq!(report.checksum_status, ChecksumStatus::Ok);
    assert_eq!(tokio::fs::read(&report.final_path).await.unwrap(), target);
    assert_eq!(report.final_path.file_name().unwrap(), "f.bin");

    std::env::set_current_dir(prev).unwrap();
}

/// Scenario 2: full local match via a seed equal to the target — the
/// scheduler must see empty `needed_ranges` on the first URL it tries and
/// never read from the fake HTTP collaborator's range path.
#[tokio::test]
async fn full_local_match_skips_network_entirely() {
    let _guard = TEST_MUTEX.lock().unwrap();
    let dir = tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let target = sample_target(BLOCK_SIZE as usize * 4);
    let control = build_control_document(&target, &["http://h/f.bin"], &[], Some("f.bin"));
    tokio::fs::write(dir.path().join("f.zsync"), &control).await.unwrap();
    let seed_path = dir.path().join("seed.bin");
    tokio::fs::write(&seed_path, &target).await.unwrap();

    // No `serve("http://h/f.bin", ...)` registered: any range fetch attempt
    // against it will fail the `get` lookup, so success here proves the
    // network path was never taken.
    let http = Arc::new(FakeHttpCollaborator::new());
    let progress = Arc::new(NullProgress);

    let mut req = base_request("f.zsync");
    req.seed_paths = vec![seed_path];

    let report = ClientDriver::run(http, progress, req).await.unwrap();

    assert_eq!(report.http_bytes_downloaded, 0);
    assert_eq!(report.local_used, target.len() as u64);
    assert_eq!(tokio::fs::read(&report.final_path).await.unwrap(), target);

    std::env::set_current_dir(prev).unwrap();
}

/// Scenario 3: resume — a prior `<out>.part` already holds the first half
/// of the target (no seeds, no finished output). Only the missing tail
/// should need fetching, and the driver must still complete successfully.
#[tokio::test]
async fn resume_from_prior_part_file() {
    let _guard = TEST_MUTEX.lock().unwrap();
    let dir = tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let target = sample_target(BLOCK_SIZE as usize * 6);
    let control = build_control_document(&target, &["http://h/f.bin"], &[], Some("f.bin"));
    tokio::fs::write(dir.path().join("f.zsync"), &control).await.unwrap();

    // Half the blocks, byte-identical to the target's leading blocks, left
    // over in `f.bin.part` by a previous aborted run.
    let half = target.len() / 2;
    tokio::fs::write(dir.path().join("f.bin.part"), &target[..half]).await.unwrap();

    let http = Arc::new(FakeHttpCollaborator::new().serve("http://h/f.bin", target.clone()));
    let progress = Arc::new(NullProgress);

    let report = ClientDriver::run(http, progress, base_request("f.zsync")).await.unwrap();

    assert_eq!(report.local_used, half as u64, "part file's block-aligned prefix should match exactly");
    assert_eq!(tokio::fs::read(&report.final_path).await.unwrap(), target);

    std::env::set_current_dir(prev).unwrap();
}

/// Scenario 4: URL failover — the first candidate fails on every chunk, the
/// second serves the whole target. The first must end up poisoned and the
/// run still succeeds via the second.
#[tokio::test]
async fn url_failover_poisons_bad_url_and_succeeds_via_second() {
    let _guard = TEST_MUTEX.lock().unwrap();
    let dir = tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let target = sample_target(BLOCK_SIZE as usize * 5);
    let control = build_control_document(&target, &["http://bad/f.bin", "http://good/f.bin"], &[], Some("f.bin"));
    tokio::fs::write(dir.path().join("f.zsync"), &control).await.unwrap();

    let http = Arc::new(
        FakeHttpCollaborator::new()
            .serve("http://bad/f.bin", target.clone())
            .fail("http://bad/f.bin")
            .serve("http://good/f.bin", target.clone()),
    );
    let progress = Arc::new(NullProgress);

    let report = ClientDriver::run(http, progress, base_request("f.zsync")).await.unwrap();

    assert_eq!(tokio::fs::read(&report.final_path).await.unwrap(), target);
    assert_eq!(report.checksum_status, ChecksumStatus::Ok);

    std::env::set_current_dir(prev).unwrap();
}

/// Scenario 5: backup preservation — an existing `f.bin` is present before
/// the run. On success it must survive as `f.bin.zs-old` with its old
/// content untouched.
#[tokio::test]
async fn install_preserves_prior_output_as_backup() {
    let _guard = TEST_MUTEX.lock().unwrap();
    let dir = tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let target = sample_target(BLOCK_SIZE as usize * 3);
    let control = build_control_document(&target, &["http://h/f.bin"], &[], Some("f.bin"));
    tokio::fs::write(dir.path().join("f.zsync"), &control).await.unwrap();

    let old_content = b"stale prior download".to_vec();
    tokio::fs::write(dir.path().join("f.bin"), &old_content).await.unwrap();

    let http = Arc::new(FakeHttpCollaborator::new().serve("http://h/f.bin", target.clone()));
    let progress = Arc::new(NullProgress);

    let report = ClientDriver::run(http, progress, base_request("f.zsync")).await.unwrap();

    assert_eq!(tokio::fs::read(&report.final_path).await.unwrap(), target);
    let backup = dir.path().join("f.bin.zs-old");
    assert_eq!(tokio::fs::read(&backup).await.unwrap(), old_content);

    std::env::set_current_dir(prev).unwrap();
}

/// Scenario 6: relative URL with no referrer — a control document loaded
/// from a local path carries a relative candidate and the caller supplies
/// no referrer override. The only candidate fails to resolve, gets
/// poisoned, and the run reports `DownloadIncomplete`.
#[tokio::test]
async fn relative_url_without_referrer_is_unfetchable() {
    let _guard = TEST_MUTEX.lock().unwrap();
    let dir = tempdir().unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let target = sample_target(BLOCK_SIZE as usize * 3);
    let control = build_control_document(&target, &["f.bin"], &[], Some("f.bin"));
    tokio::fs::write(dir.path().join("f.zsync"), &control).await.unwrap();

    let http = Arc::new(FakeHttpCollaborator::new());
    let progress = Arc::new(NullProgress);

    let err = ClientDriver::run(http, progress, base_request("f.zsync")).await.unwrap_err();
    assert!(matches!(err, ClientError::DownloadIncomplete { .. }));

    // The `.part` scratch file must survive the failed run for a future
    // resume attempt.
    let part = dir.path().join("f.bin.part");
    assert!(tokio::fs::metadata(&part).await.is_ok());

    std::env::set_current_dir(prev).unwrap();
}
