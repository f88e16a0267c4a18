//! End-to-end tests for the analysis pipeline.

use deepscan::pipeline::{AnalysisError, Pipeline};
use deepscan::store::SpectrogramStore;
use deepscan_detect::error::InferenceError;
use deepscan_detect::models::ModelHandle;
use deepscan_detect::predict::OutputSemantics;
use deepscan_detect::resolver::{ModelResolver, ResolverConfig};
use deepscan_detect::service::ModelService;
use deepscan_detect::types::Label;
use deepscan_media::{MediaNormalizer, MediaSource, Transcoder};
use ndarray::{ArrayD, ArrayView4, IxDyn};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn silence_wav_bytes(seconds: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for _ in 0..16000 * seconds {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// Classifier that checks its input shape and answers with a fixed probability.
fn constant(fake: f32) -> ModelHandle {
    let classifier = move |input: ArrayView4<'_, f32>| -> Result<ArrayD<f32>, InferenceError> {
        assert_eq!(input.shape(), [1, 40, 500, 1]);
        Ok(ArrayD::from_elem(IxDyn(&[1, 1]), fake))
    };
    ModelHandle::new(classifier, "injected.onnx", OutputSemantics::Sigmoid)
}

struct Fixture {
    scratch: TempDir,
    static_dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            scratch: TempDir::new().unwrap(),
            static_dir: TempDir::new().unwrap(),
        }
    }

    fn pipeline(&self, model: ModelService, ffmpeg: &str) -> Pipeline {
        Pipeline::new(model)
            .with_normalizer(MediaNormalizer {
                transcoder: Transcoder {
                    program: PathBuf::from(ffmpeg),
                    ..Transcoder::default()
                },
                scratch_root: Some(self.scratch.path().to_path_buf()),
                ..MediaNormalizer::default()
            })
            .with_store(SpectrogramStore::in_static_dir(self.static_dir.path()))
    }

    fn spectrograms(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.static_dir.path().join("spectrograms")) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn scratch_is_empty(&self) -> bool {
        is_empty_dir(self.scratch.path())
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn silent_wav_upload_produces_report() {
    let fixture = Fixture::new();
    // ffmpeg must not be needed for a WAV upload
    let model = ModelService::with_handle(constant(0.3));
    let pipeline = fixture.pipeline(model, "deepscan-no-such-ffmpeg");

    let source = MediaSource::upload(silence_wav_bytes(2), Some("silence.wav".into()));
    let report = pipeline.analyze(source).await.unwrap();

    assert_eq!(report.prediction, Label::Real);
    assert!((0.5..=1.0).contains(&report.confidence));
    assert!((report.probabilities.fake + report.probabilities.real - 1.0).abs() < 1e-6);
    assert_eq!(report.model_file, "injected.onnx");
    assert_eq!(report.file_name, "silence.wav");
    assert!(report.analysis_time >= 0.0);
    assert!(report.spectrogram.starts_with("data:image/png;base64,"));
    assert!(report.spectrogram_path.starts_with("/static/spectrograms/spect_"));

    let stored = fixture.spectrograms();
    assert_eq!(stored.len(), 1);
    let name = stored[0].file_name().unwrap().to_str().unwrap();
    assert!(report.spectrogram_path.ends_with(name));

    assert!(fixture.scratch_is_empty());
}

#[tokio::test]
async fn report_serializes_with_service_field_names() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(ModelService::with_handle(constant(0.8)), "ffmpeg");

    let report = pipeline
        .analyze(MediaSource::upload(silence_wav_bytes(1), None))
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["prediction"], "fake");
    assert_eq!(json["file_name"], "uploaded_audio");
    assert!(json["probabilities"]["fake"].is_number());
    assert!(json["probabilities"]["real"].is_number());
    for key in ["confidence", "model_file", "spectrogram", "spectrogram_path", "analysis_time"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn conversion_failure_leaves_nothing_behind() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(ModelService::with_handle(constant(0.9)), "false");

    let source = MediaSource::upload(b"just some text".to_vec(), Some("notes.mp4".into()));
    let err = pipeline.analyze(source).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Conversion(_)));
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().starts_with("Audio conversion failed"));
    assert!(fixture.spectrograms().is_empty());
    assert!(fixture.scratch_is_empty());
}

#[tokio::test]
async fn missing_model_fails_every_request_alike() {
    let fixture = Fixture::new();
    let model_dir = TempDir::new().unwrap();
    let service = ModelService::new(ModelResolver::new(ResolverConfig::with_model_dir(
        model_dir.path(),
    )));
    let pipeline = fixture.pipeline(service, "ffmpeg");

    let mut messages = Vec::new();
    for _ in 0..2 {
        let source = MediaSource::upload(silence_wav_bytes(1), Some("a.wav".into()));
        let err = pipeline.analyze(source).await.unwrap_err();

        assert!(matches!(err, AnalysisError::ModelNotLoaded(_)));
        assert!(err.to_string().starts_with("Model not loaded on server"));
        messages.push(err.to_string());
    }

    assert_eq!(messages[0], messages[1]);
    assert!(!pipeline.model().is_loaded());
    assert!(fixture.spectrograms().is_empty());
    assert!(fixture.scratch_is_empty());
}

#[tokio::test]
async fn forward_failure_is_an_inference_error() {
    let fixture = Fixture::new();
    let failing = |_: ArrayView4<'_, f32>| -> Result<ArrayD<f32>, InferenceError> {
        Err(InferenceError::NonFinite(f32::NAN))
    };
    let handle = ModelHandle::new(failing, "broken.onnx", OutputSemantics::Sigmoid);
    let pipeline = fixture.pipeline(ModelService::with_handle(handle), "ffmpeg");

    let err = pipeline
        .analyze(MediaSource::upload(silence_wav_bytes(1), Some("a.wav".into())))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Inference(_)));
    assert!(err.to_string().starts_with("Inference error"));
    assert!(fixture.spectrograms().is_empty());
}

#[tokio::test]
async fn empty_url_is_a_bad_request() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(ModelService::with_handle(constant(0.5)), "ffmpeg");

    let err = pipeline.analyze(MediaSource::url("  ")).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Input(_)));
    assert_eq!(err.status_code(), 400);
    assert!(fixture.scratch_is_empty());
}

#[tokio::test]
async fn pipeline_is_shared_across_concurrent_requests() {
    let fixture = Fixture::new();
    let pipeline = std::sync::Arc::new(
        fixture.pipeline(ModelService::with_handle(constant(0.7)), "ffmpeg"),
    );

    let tasks: Vec<_> = (0..3)
        .map(|i| {
            let pipeline = std::sync::Arc::clone(&pipeline);
            tokio::spawn(async move {
                let source = MediaSource::upload(silence_wav_bytes(1), Some(format!("{i}.wav")));
                pipeline.analyze(source).await
            })
        })
        .collect();

    for task in tasks {
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.prediction, Label::Fake);
    }
    assert_eq!(fixture.spectrograms().len(), 3);
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn text_renamed_to_mp4_fails_conversion() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(ModelService::with_handle(constant(0.5)), "ffmpeg");

    let source = MediaSource::upload(b"hello, world".to_vec(), Some("fake.mp4".into()));
    let err = pipeline.analyze(source).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Conversion(_)));
    assert!(fixture.spectrograms().is_empty());
    assert!(fixture.scratch_is_empty());
}
