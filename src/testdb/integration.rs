//! Integration tests using the real handle code with the mock library
//!
//! These tests drive [`ContainerHandle`] and [`ImageHandle`] end to end
//! against [`MockWim`]: capture a directory, reopen the container,
//! enumerate, apply to a fresh directory and compare the trees. They also
//! cover the lifecycle rules (idempotent close, closed handles, index
//! validation) and the callback plumbing (fallback registration, abort,
//! late messages, concurrent operations).

use super::mock_native::{MockConfig, MockImage, MockWim};
use super::tree::{compare_trees, write_sample_tree, TreeDifference};
use crate::core::callback::registry;
use crate::core::config::Config;
use crate::core::container::ContainerHandle;
use crate::core::error::{NativeError, Result, WimError};
use crate::core::progress::{DecodedProgressEvent, MessageKind, MSG_STEP_IT};
use crate::core::options::{ApplyOptions, CaptureOptions, OpenOptions};
use crate::native::traits::{WimApi, CALLBACK_SUCCESS};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Files written by `write_sample_tree`
const SAMPLE_FILES: usize = 5;

/// SetRange, three messages per file, SetPos and Done
const SAMPLE_MESSAGES: usize = 1 + SAMPLE_FILES * 3 + 2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn counting_options(counter: Arc<AtomicUsize>) -> ApplyOptions {
    ApplyOptions::new().with_progress(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        false
    })
}

/// Capture `source` into `archive`, reopen read-only, list, apply into
/// `target` and return how the applied tree differs from the source.
/// Scratch files go to `scratch` in both phases.
fn round_trip(
    api: Arc<dyn WimApi>,
    archive: &Path,
    scratch: &Path,
    source: &Path,
    target: &Path,
) -> Result<Vec<TreeDifference>> {
    {
        let container = ContainerHandle::open(api.clone(), archive, OpenOptions::create())?;
        container.set_temporary_path(scratch)?;
        let image = container.capture(source, CaptureOptions::new())?;
        image.close()?;
        container.close()?;
    }

    let container = ContainerHandle::open(api, archive, OpenOptions::read())?;
    container.set_temporary_path(scratch)?;
    assert_eq!(container.image_count()?, 1);
    let images = container.images()?;
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].index, 1);

    let image = container.load_image(1)?;
    image.apply(target, ApplyOptions::new())?;
    image.close()?;
    container.close()?;

    compare_trees(source, target)
}

/// Container at `archive` holding one captured copy of the sample tree
fn seeded(mock: &Arc<MockWim>, archive: &Path) -> tempfile::TempDir {
    let source = tempfile::tempdir().unwrap();
    write_sample_tree(source.path()).unwrap();

    let container = ContainerHandle::open(mock.clone(), archive, OpenOptions::create()).unwrap();
    container
        .capture(source.path(), CaptureOptions::new())
        .unwrap()
        .close()
        .unwrap();
    container.close().unwrap();
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_against_mock() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let work = tempfile::tempdir().unwrap();
        let source = work.path().join("source");
        let target = work.path().join("target");
        let scratch = work.path().join("scratch");
        write_sample_tree(&source).unwrap();
        std::fs::create_dir(&scratch).unwrap();

        let differences =
            round_trip(mock.clone(), &work.path().join("rt.wim"), &scratch, &source, &target)
                .unwrap();
        assert!(differences.is_empty(), "trees differ: {:?}", differences);

        assert_eq!(mock.calls("WIMSetTemporaryPath"), 2);
        assert_eq!(mock.open_handles(), 0);
        assert_eq!(mock.outstanding_blobs(), 0);
        assert_eq!(mock.attached_callbacks(), 0);
    }

    #[test]
    fn test_capture_reports_decoded_progress() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let source = tempfile::tempdir().unwrap();
        write_sample_tree(source.path()).unwrap();

        let events: Arc<Mutex<Vec<DecodedProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let options = CaptureOptions::new().with_decoded_progress(move |event| {
            sink.lock().unwrap().push(event.clone());
            false
        });

        let container = ContainerHandle::open(mock.clone(), "progress.wim", OpenOptions::create()).unwrap();
        let image = container.capture(source.path(), options).unwrap();

        let info = image.info().unwrap();
        assert_eq!(info.index, 1);
        assert_eq!(
            info.name,
            source.path().file_name().unwrap().to_string_lossy()
        );

        let events = events.lock().unwrap();
        assert_eq!(events.len(), SAMPLE_MESSAGES);
        assert_eq!(events[0].kind(), MessageKind::SetRange);
        assert_eq!(events[0].total, SAMPLE_FILES as u64);

        let set_pos = &events[events.len() - 2];
        assert_eq!(set_pos.kind(), MessageKind::SetPos);
        assert_eq!(set_pos.current, SAMPLE_FILES as u64);
        assert_eq!(set_pos.percent, 100.0);

        let done = events.last().unwrap();
        assert_eq!(done.kind(), MessageKind::Done);
        assert_eq!(done.summary, "DONE");
        assert_eq!(events.iter().filter(|e| e.noisy).count(), SAMPLE_FILES * 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let container = ContainerHandle::open(mock.clone(), "close.wim", OpenOptions::create()).unwrap();

        container.close().unwrap();
        container.close().unwrap();
        assert!(container.is_closed());
        drop(container);

        assert_eq!(mock.calls("WIMCloseHandle"), 1);
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn test_drop_closes_handles() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        mock.add_image("drop.wim", MockImage::new("only", vec![]));
        {
            let container = ContainerHandle::open(mock.clone(), "drop.wim", OpenOptions::read()).unwrap();
            let _image = container.load_image(1).unwrap();
            assert_eq!(mock.open_handles(), 2);
        }
        assert_eq!(mock.calls("WIMCloseHandle"), 2);
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn test_image_outlives_container_close() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("order.wim");
        let source = seeded(&mock, &archive);

        let container = ContainerHandle::open(mock.clone(), &archive, OpenOptions::read()).unwrap();
        let image = container.load_image(1).unwrap();
        container.close().unwrap();

        image.apply(work.path().join("out"), ApplyOptions::new()).unwrap();
        image.close().unwrap();
        assert!(compare_trees(source.path(), &work.path().join("out")).unwrap().is_empty());
    }

    #[test]
    fn test_load_image_rejects_bad_indices() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        mock.add_image("index.wim", MockImage::new("only", vec![]));
        let container = ContainerHandle::open(mock.clone(), "index.wim", OpenOptions::read()).unwrap();

        for index in [0, -1, i64::from(u32::MAX) + 1, i64::MIN] {
            match container.load_image(index) {
                Err(WimError::InvalidIndex(got)) => assert_eq!(got, index),
                other => panic!("index {} gave {:?}", index, other.map(|i| i.raw())),
            }
        }
        assert_eq!(mock.calls("WIMLoadImage"), 0);

        let err = container.load_image(2).unwrap_err();
        assert!(matches!(err, WimError::LoadFailed(_)));
        assert!(format!("{:?}", container).contains("\"container\""));
        assert!(err.is(&NativeError::INVALID_PARAMETER));
        assert_eq!(mock.calls("WIMLoadImage"), 1);
    }

    #[test]
    fn test_closed_handles_make_no_native_calls() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let container = ContainerHandle::open(mock.clone(), "closed.wim", OpenOptions::create()).unwrap();
        container.close().unwrap();
        let before = mock.total_calls();

        assert!(matches!(
            container.image_count(),
            Err(WimError::Closed {
                operation: "WIMGetImageCount"
            })
        ));
        assert!(matches!(
            container.load_image(1).map(|_| ()),
            Err(WimError::Closed { .. })
        ));
        assert!(matches!(
            container.capture(".", CaptureOptions::new()).map(|_| ()),
            Err(WimError::Closed { .. })
        ));
        assert!(matches!(
            container.set_temporary_path("."),
            Err(WimError::Closed { .. })
        ));
        assert_eq!(mock.total_calls(), before);
    }

    #[test]
    fn test_close_on_another_thread_is_seen_by_later_calls() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let container = Arc::new(
            ContainerHandle::open(mock.clone(), "threads.wim", OpenOptions::create()).unwrap(),
        );

        let closer = container.clone();
        thread::spawn(move || closer.close().unwrap()).join().unwrap();
        let before = mock.total_calls();

        assert!(container.is_closed());
        assert!(matches!(
            container.image_count(),
            Err(WimError::Closed { .. })
        ));
        assert_eq!(mock.total_calls(), before);
        assert_eq!(mock.calls("WIMCloseHandle"), 1);
    }

    #[test]
    fn test_open_failures_carry_native_code() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let err = ContainerHandle::open(mock.clone(), "missing.wim", OpenOptions::default())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, WimError::OpenFailed(_)));
        assert!(err.is(&NativeError::FILE_NOT_FOUND));
        assert_eq!(
            err.native().unwrap().message,
            "The system cannot find the file specified."
        );

        let denied = Arc::new(MockWim::with_config(MockConfig {
            open_failure: Some(5),
            ..MockConfig::default()
        }));
        let err = ContainerHandle::open(denied, "any.wim", OpenOptions::create())
            .map(|_| ())
            .unwrap_err();
        assert!(err.is(&NativeError::ACCESS_DENIED));
    }

    #[test]
    fn test_zero_count_is_only_an_error_with_a_code() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let container = ContainerHandle::open(mock, "empty.wim", OpenOptions::create()).unwrap();
        assert_eq!(container.image_count().unwrap(), 0);
        assert!(container.images().unwrap().is_empty());

        let failing = Arc::new(MockWim::with_config(MockConfig {
            count_failure: Some(6),
            ..MockConfig::default()
        }));
        let container = ContainerHandle::open(failing, "empty.wim", OpenOptions::create()).unwrap();
        let err = container.image_count().unwrap_err();
        assert!(matches!(err, WimError::CountFailed(_)));
        assert_eq!(err.code(), Some(6));
    }

    #[test]
    fn test_image_listing() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        for name in ["first", "second", "third"] {
            mock.add_image("list.wim", MockImage::new(name, vec![]));
        }
        let container = ContainerHandle::open(mock.clone(), "list.wim", OpenOptions::read()).unwrap();

        let images = container.images().unwrap();
        let names: Vec<_> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(images[2].index, 3);
        assert_eq!(mock.open_handles(), 1);
        assert_eq!(mock.outstanding_blobs(), 0);
    }

    #[test]
    fn test_image_listing_aborts_on_first_failure() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            malformed_info: true,
            ..MockConfig::default()
        }));
        mock.add_image("bad.wim", MockImage::new("first", vec![]));
        mock.add_image("bad.wim", MockImage::new("second", vec![]));
        let container = ContainerHandle::open(mock.clone(), "bad.wim", OpenOptions::read()).unwrap();

        assert!(matches!(
            container.images(),
            Err(WimError::InfoDecodeFailed(_))
        ));
        assert_eq!(mock.calls("WIMLoadImage"), 1);
        assert_eq!(mock.open_handles(), 1);
        assert_eq!(mock.outstanding_blobs(), 0);
    }

    #[test]
    fn test_info_without_release_entry_point() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            free_memory_missing: true,
            ..MockConfig::default()
        }));
        mock.add_image("nofree.wim", MockImage::new("kept", vec![]));
        let container = ContainerHandle::open(mock.clone(), "nofree.wim", OpenOptions::read()).unwrap();

        let info = container.load_image(1).unwrap().info().unwrap();
        assert_eq!(info.name, "kept");
        assert_eq!(mock.outstanding_blobs(), 1);
    }

    #[test]
    fn test_apply_falls_back_to_container_registration() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            reject_image_registration: true,
            ..MockConfig::default()
        }));
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("fallback.wim");
        seeded(&mock, &archive);
        let registrations = mock.calls("WIMRegisterMessageCallback");

        let container = ContainerHandle::open(mock.clone(), &archive, OpenOptions::read()).unwrap();
        let image = container.load_image(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        image
            .apply(work.path().join("out"), counting_options(counter.clone()))
            .unwrap();

        assert_eq!(mock.calls("WIMRegisterMessageCallback"), registrations + 2);
        assert_eq!(mock.calls("WIMUnregisterMessageCallback"), 1);
        assert_eq!(counter.load(Ordering::SeqCst), SAMPLE_MESSAGES);
        assert_eq!(mock.attached_callbacks(), 0);
    }

    #[test]
    fn test_registration_refused_everywhere() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            reject_registration: true,
            ..MockConfig::default()
        }));
        mock.add_image("refuse.wim", MockImage::new("only", vec![]));
        let work = tempfile::tempdir().unwrap();
        let container = ContainerHandle::open(mock.clone(), "refuse.wim", OpenOptions::read()).unwrap();
        let image = container.load_image(1).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let err = image
            .apply(work.path().join("out"), counting_options(counter))
            .unwrap_err();
        assert!(matches!(err, WimError::RegisterFailed(_)));
        assert_eq!(mock.calls("WIMRegisterMessageCallback"), 2);
        assert_eq!(mock.calls("WIMApplyImage"), 0);

        image.apply(work.path().join("out"), ApplyOptions::new()).unwrap();
    }

    #[test]
    fn test_capture_registration_refused() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            reject_registration: true,
            ..MockConfig::default()
        }));
        let source = tempfile::tempdir().unwrap();
        write_sample_tree(source.path()).unwrap();
        let container = ContainerHandle::open(mock.clone(), "refuse-capture.wim", OpenOptions::create()).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let options = CaptureOptions::new().with_progress(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });
        let err = container.capture(source.path(), options).map(|_| ()).unwrap_err();
        assert!(matches!(err, WimError::RegisterFailed(_)));
        assert!(err.is(&NativeError::INVALID_PARAMETER));
        assert_eq!(mock.calls("WIMRegisterMessageCallback"), 1);
        assert_eq!(mock.calls("WIMCaptureImage"), 0);

        container
            .capture(source.path(), CaptureOptions::new())
            .unwrap()
            .close()
            .unwrap();
        assert_eq!(mock.calls("WIMCaptureImage"), 1);
    }

    #[test]
    fn test_detach_failure_does_not_fail_apply() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            reject_unregistration: true,
            ..MockConfig::default()
        }));
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("detach.wim");
        let source = seeded(&mock, &archive);

        let container = ContainerHandle::open(mock.clone(), &archive, OpenOptions::read()).unwrap();
        let image = container.load_image(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        image
            .apply(work.path().join("out"), counting_options(counter.clone()))
            .unwrap();

        let token = mock.last_callback_token().unwrap();
        assert!(!registry().contains(token));
        assert_eq!(mock.calls("WIMUnregisterMessageCallback"), 1);
        assert_eq!(mock.attached_callbacks(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), SAMPLE_MESSAGES);
        assert!(compare_trees(source.path(), &work.path().join("out")).unwrap().is_empty());

        // the library still holds the callback; later messages find no handler
        assert_eq!(
            mock.replay_last_callback(MSG_STEP_IT, 0, 0),
            Some(CALLBACK_SUCCESS)
        );
        assert_eq!(counter.load(Ordering::SeqCst), SAMPLE_MESSAGES);
    }

    #[test]
    fn test_detach_failure_does_not_fail_capture() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            reject_unregistration: true,
            ..MockConfig::default()
        }));
        let source = tempfile::tempdir().unwrap();
        write_sample_tree(source.path()).unwrap();
        let container = ContainerHandle::open(mock.clone(), "detach-capture.wim", OpenOptions::create()).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let sink = counter.clone();
        let options = CaptureOptions::new().with_progress(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
            false
        });
        let image = container.capture(source.path(), options).unwrap();

        let token = mock.last_callback_token().unwrap();
        assert!(!registry().contains(token));
        assert_eq!(mock.calls("WIMUnregisterMessageCallback"), 1);
        assert_eq!(counter.load(Ordering::SeqCst), SAMPLE_MESSAGES);
        assert_eq!(image.info().unwrap().index, 1);
    }

    #[test]
    fn test_abort_is_reported_as_failure() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("abort.wim");
        seeded(&mock, &archive);

        let container = ContainerHandle::open(mock.clone(), &archive, OpenOptions::read()).unwrap();
        let image = container.load_image(1).unwrap();
        let options = ApplyOptions::new().with_progress(|event| event.message_id == MSG_STEP_IT);

        let err = image.apply(work.path().join("out"), options).unwrap_err();
        assert!(matches!(err, WimError::ApplyFailed(_)));
        assert!(err.is_aborted());
        assert_eq!(mock.calls("WIMUnregisterMessageCallback"), 1);
        assert_eq!(mock.attached_callbacks(), 0);
    }

    #[test]
    fn test_panicking_handler_aborts_operation() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("panic.wim");
        seeded(&mock, &archive);

        let container = ContainerHandle::open(mock.clone(), &archive, OpenOptions::read()).unwrap();
        let image = container.load_image(1).unwrap();
        let options = ApplyOptions::new().with_progress(|_| -> bool { panic!("handler bug") });

        let err = image.apply(work.path().join("out"), options).unwrap_err();
        assert!(err.is_aborted());
    }

    #[test]
    fn test_late_messages_after_release_are_ignored() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("late.wim");
        seeded(&mock, &archive);

        let container = ContainerHandle::open(mock.clone(), &archive, OpenOptions::read()).unwrap();
        let image = container.load_image(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        image
            .apply(work.path().join("out"), counting_options(counter.clone()))
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), SAMPLE_MESSAGES);

        assert_eq!(
            mock.replay_last_callback(MSG_STEP_IT, 0, 0),
            Some(CALLBACK_SUCCESS)
        );
        assert_eq!(counter.load(Ordering::SeqCst), SAMPLE_MESSAGES);
    }

    #[test]
    fn test_concurrent_applies_are_isolated() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("shared.wim");
        let source = seeded(&mock, &archive);

        let mut workers = Vec::new();
        for worker in 0..4 {
            let mock = mock.clone();
            let archive = archive.clone();
            let target = work.path().join(format!("out-{}", worker));
            workers.push(thread::spawn(move || {
                let container = ContainerHandle::open(mock, &archive, OpenOptions::read()).unwrap();
                let image = container.load_image(1).unwrap();
                let counter = Arc::new(AtomicUsize::new(0));
                image.apply(&target, counting_options(counter.clone())).unwrap();
                (target, counter.load(Ordering::SeqCst))
            }));
        }

        for handle in workers {
            let (target, seen) = handle.join().unwrap();
            assert_eq!(seen, SAMPLE_MESSAGES);
            assert!(compare_trees(source.path(), &target).unwrap().is_empty());
        }
    }

    #[test]
    fn test_temporary_path() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let scratch = tempfile::tempdir().unwrap();
        let container = ContainerHandle::open(mock.clone(), "temp.wim", OpenOptions::create()).unwrap();

        container.set_temporary_path(scratch.path()).unwrap();
        assert_eq!(
            mock.temporary_path(container.raw()).as_deref(),
            Some(scratch.path())
        );

        let err = container
            .set_temporary_path(scratch.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, WimError::TemporaryPathFailed(_)));
        assert!(err.is(&NativeError::PATH_NOT_FOUND));
    }

    #[test]
    fn test_open_with_config() {
        init_logging();
        let mock = Arc::new(MockWim::new());
        let scratch = tempfile::tempdir().unwrap();
        let config = Config::from_toml(&format!(
            "[open]\nwrite = true\ncreation_disposition = \"create-always\"\n\n[temp]\ndirectory = {:?}\n",
            scratch.path().to_string_lossy()
        ))
        .unwrap();

        let container = ContainerHandle::open_with_config(mock.clone(), "cfg.wim", &config).unwrap();
        assert_eq!(
            mock.temporary_path(container.raw()).as_deref(),
            Some(scratch.path())
        );
        assert_eq!(container.image_count().unwrap(), 0);
    }

    #[test]
    fn test_privilege_errors() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig::unprivileged()));
        let source = tempfile::tempdir().unwrap();
        let container = ContainerHandle::open(mock.clone(), "priv.wim", OpenOptions::create()).unwrap();

        let err = container
            .capture(source.path(), CaptureOptions::new())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, WimError::CaptureFailed(_)));
        assert!(err.is_privilege_error());
    }

    #[test]
    fn test_failed_close_can_be_retried_and_drop_does_not_panic() {
        init_logging();
        let mock = Arc::new(MockWim::with_config(MockConfig {
            close_failure: Some(6),
            ..MockConfig::default()
        }));
        let container = ContainerHandle::open(mock.clone(), "stuck.wim", OpenOptions::create()).unwrap();

        assert!(matches!(container.close(), Err(WimError::CloseFailed(_))));
        assert!(!container.is_closed());
        assert!(container.close().is_err());
        drop(container);
        assert_eq!(mock.calls("WIMCloseHandle"), 3);
    }

    /// Runs the round trip against the installed library.
    ///
    /// Needs `WIMGAPI_INTEGRATION=1`; skipped when the process lacks the
    /// privileges capture and apply require.
    #[cfg(windows)]
    #[test]
    #[ignore]
    fn test_round_trip_against_wimgapi() {
        use crate::native::wimgapi::Wimgapi;

        init_logging();
        if std::env::var("WIMGAPI_INTEGRATION").as_deref() != Ok("1") {
            eprintln!("WIMGAPI_INTEGRATION is not set; skipping");
            return;
        }

        let api = Arc::new(Wimgapi::load().unwrap());
        let work = tempfile::tempdir().unwrap();
        let source = work.path().join("source");
        let target = work.path().join("target");
        let scratch = work.path().join("scratch");
        write_sample_tree(&source).unwrap();
        std::fs::create_dir(&scratch).unwrap();

        match round_trip(api, &work.path().join("rt.wim"), &scratch, &source, &target) {
            Ok(differences) => assert!(differences.is_empty(), "trees differ: {:?}", differences),
            Err(e) if e.is_privilege_error() => eprintln!("skipping: {}", e),
            Err(e) => panic!("round trip failed: {}", e),
        }
    }
}
