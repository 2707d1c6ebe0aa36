//! Shared wiring for the end-to-end tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use framewatch_core::application::{
    AdmissionGate, FrameExtractor, InvocationRequest, ProcessRegistry,
};
use framewatch_core::domain::CommandLine;
use framewatch_core::port::id_provider::UuidProvider;
use framewatch_core::port::time_provider::SystemTimeProvider;
use framewatch_infra_system::{FsOutputProbe, TokioProcessSpawner};

pub const GRACE: Duration = Duration::from_millis(300);

/// Real spawner, real filesystem, short termination grace
pub fn extractor(capacity: usize) -> FrameExtractor {
    FrameExtractor::new(
        Arc::new(TokioProcessSpawner::new(vec!["PATH".to_string()])),
        Arc::new(FsOutputProbe),
        Arc::new(AdmissionGate::new(capacity)),
        Arc::new(ProcessRegistry::new()),
        Arc::new(SystemTimeProvider),
        Arc::new(UuidProvider),
    )
    .with_termination_grace(GRACE)
}

/// `/bin/sh -c script` standing in for ffmpeg, writing into `dir`
pub fn sh_request(script: &str, dir: &Path, poll: Duration) -> InvocationRequest {
    let command = CommandLine::new("/bin/sh", dir).args(["-c", script]);
    InvocationRequest::new(command, "clip.mp4")
        .with_output_dir(dir)
        .with_poll_interval(poll)
}

/// Shell loop touching `count` frames, one every 100ms
pub fn frame_writer(count: usize) -> String {
    format!(
        "i=1; while [ $i -le {count} ]; do touch img_$i.jpg; sleep 0.1; i=$((i+1)); done"
    )
}

pub fn assert_idle(extractor: &FrameExtractor) {
    assert!(extractor.registry().is_empty(), "registry must be empty");
    assert_eq!(
        extractor.admission().available(),
        extractor.admission().capacity(),
        "every admission slot must be released"
    );
}
