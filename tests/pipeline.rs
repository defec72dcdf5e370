// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 端到端流水线测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use image::{Rgb, RgbImage};

use shanan_waste::{
  Detection, INPUT_SIZE, NUM_CLASSES,
  decode::{BOX_ROWS, PostprocessConfig},
  frame::{RawTensor, RgbaFrame},
  model::{InferenceError, Model, ModelLoadError, ModelLoader, ModelRuntime, WasteLabel},
  pipeline::{FrameOutcome, FramePipeline, SkipReason, StillImagePipeline},
};

#[cfg(feature = "directory_record")]
use std::path::{Path, PathBuf};

#[cfg(feature = "directory_record")]
use shanan_waste::{input::ImageFolderInput, output::DirectoryRecordOutput, task::ContinuousTask};

const SIZE: f32 = INPUT_SIZE as f32;

/// 每个锚点 `(x1, y1, x2, y2, class, score)`，编码成 `[4 + C, A]` 行优先输出
fn encode(anchors: &[([f32; 4], usize, f32)]) -> Vec<f32> {
  let count = anchors.len();
  let mut data = vec![0.0; (BOX_ROWS + NUM_CLASSES) * count];
  for (a, ([x1, y1, x2, y2], class, score)) in anchors.iter().enumerate() {
    data[a] = (x1 + x2) / 2.0 / SIZE;
    data[count + a] = (y1 + y2) / 2.0 / SIZE;
    data[2 * count + a] = (x2 - x1) / SIZE;
    data[3 * count + a] = (y2 - y1) / SIZE;
    data[(BOX_ROWS + class) * count + a] = *score;
  }
  data
}

struct CannedModel {
  output: Vec<f32>,
  calls: Arc<AtomicUsize>,
}

impl<const S: u32> Model<S> for CannedModel {
  fn infer(&self, _input: &RawTensor<S>) -> Result<Vec<f32>, InferenceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.output.clone())
  }
}

struct CannedLoader {
  output: Vec<f32>,
  calls: Arc<AtomicUsize>,
}

impl<const S: u32> ModelLoader<S> for CannedLoader {
  type Model = CannedModel;

  fn load(&self) -> Result<Self::Model, ModelLoadError> {
    Ok(CannedModel {
      output: self.output.clone(),
      calls: self.calls.clone(),
    })
  }
}

type Runtime = ModelRuntime<CannedLoader, { INPUT_SIZE }>;

fn two_overlapping_boxes() -> (Arc<Runtime>, Arc<AtomicUsize>) {
  let calls = Arc::new(AtomicUsize::new(0));
  let output = encode(&[
    ([100.0, 100.0, 200.0, 200.0], 2, 0.9),
    ([110.0, 110.0, 210.0, 210.0], 5, 0.4),
  ]);
  let runtime = Arc::new(ModelRuntime::new(CannedLoader {
    output,
    calls: calls.clone(),
  }));
  (runtime, calls)
}

fn assert_single_recyclable(detections: &[Detection]) {
  assert_eq!(detections.len(), 1);
  let detection = detections[0];
  assert_eq!(detection.class_id, 2);
  assert_eq!(detection.label::<WasteLabel>(), Some(WasteLabel::Recyclables));
  assert!((detection.confidence - 0.9).abs() < 1e-6);
  for (actual, expected) in detection.bbox.iter().zip([100.0, 100.0, 200.0, 200.0]) {
    assert!((actual - expected).abs() < 1e-3, "{actual} != {expected}");
  }
}

#[tokio::test]
async fn overlapping_boxes_collapse_to_the_most_confident() {
  let (runtime, calls) = two_overlapping_boxes();
  let pipeline = StillImagePipeline::new(runtime).with_config(PostprocessConfig::new(INPUT_SIZE));

  let tensor = RawTensor::try_from(vec![0.5; RawTensor::<{ INPUT_SIZE }>::LEN]).unwrap();
  let result = pipeline.detect_tensor(tensor).await.unwrap();

  assert_single_recyclable(&result.detections);
  assert!((result.confidence - 0.9).abs() < 1e-6);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn still_image_from_disk() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("bin.png");
  RgbImage::from_pixel(32, 24, Rgb([90, 140, 60]))
    .save(&path)
    .unwrap();

  let (runtime, _) = two_overlapping_boxes();
  let pipeline = StillImagePipeline::new(runtime.clone());
  assert!(!runtime.is_ready());

  let result = pipeline.detect_objects(&path).await.unwrap();
  assert!(runtime.is_ready());
  assert_single_recyclable(&result.detections);
}

#[tokio::test]
async fn unreadable_image_is_an_analysis_failure() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("broken.jpg");
  std::fs::write(&path, b"definitely not a jpeg").unwrap();

  let (runtime, calls) = two_overlapping_boxes();
  let pipeline = StillImagePipeline::new(runtime);
  let err = pipeline.detect_objects(&path).await.unwrap_err();

  assert!(err.to_string().starts_with("分析失败"));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn frames_are_processed_independently() {
  let (runtime, calls) = two_overlapping_boxes();
  runtime.warmup().await.unwrap();
  let pipeline = FramePipeline::new(runtime);

  let mut seen: Vec<Vec<Detection>> = Vec::new();
  let frames = [
    RgbaFrame::filled(64, 48, [200, 120, 40, 255]),
    RgbaFrame::filled(64, 48, [0, 0, 0, 255]),
    RgbaFrame::filled(16, 16, [30, 160, 90, 255]),
  ];
  let outcomes: Vec<_> = frames
    .iter()
    .map(|frame| pipeline.process_frame(frame, |d| seen.push(d.to_vec())))
    .collect();

  assert_eq!(
    outcomes,
    vec![
      FrameOutcome::Detected(1),
      FrameOutcome::Skipped(SkipReason::Degenerate),
      FrameOutcome::Detected(1),
    ]
  );
  assert_single_recyclable(&seen[0]);
  assert!(seen[1].is_empty());
  assert_eq!(seen[0], seen[2]);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[cfg(feature = "directory_record")]
fn json_files(dir: &Path) -> Vec<PathBuf> {
  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir).unwrap() {
    let path = entry.unwrap().path();
    if path.is_dir() {
      files.extend(json_files(&path));
    } else if path.extension().is_some_and(|ext| ext == "json") {
      files.push(path);
    }
  }
  files
}

#[cfg(feature = "directory_record")]
#[tokio::test]
async fn folder_frames_are_recorded() {
  let frames = tempfile::tempdir().unwrap();
  for (name, color) in [("000.png", [120, 60, 30]), ("001.jpg", [40, 80, 160])] {
    RgbImage::from_pixel(20, 10, Rgb(color))
      .save(frames.path().join(name))
      .unwrap();
  }
  let records = tempfile::tempdir().unwrap();

  let (runtime, _) = two_overlapping_boxes();
  runtime.warmup().await.unwrap();
  let pipeline = FramePipeline::new(runtime);
  let input = ImageFolderInput::from_dir(frames.path()).unwrap();
  let output = DirectoryRecordOutput::new(records.path(), false);

  let processed = ContinuousTask::default()
    .run_task(input.into_frames(), &pipeline, &output)
    .unwrap();

  assert_eq!(processed, 2);
  let files = json_files(records.path());
  assert_eq!(files.len(), 2);
  let record: serde_json::Value = serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
  assert_eq!(record["detections"][0]["label"], "recyclables");
}
