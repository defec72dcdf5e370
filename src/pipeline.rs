// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 静态图像与连续帧检测流水线
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

use std::{path::Path, sync::Arc};

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  decode::PostprocessConfig,
  frame::{CameraFrame, RawTensor},
  model::{
    Detection, INPUT_SIZE, InferenceError, ModelLoadError, ModelLoader, ModelRuntime,
    ObjectDetectionResult, TractModelBuilder,
  },
  preprocess::{self, PreprocessError},
};

/// 默认 ONNX 后端与默认输入尺寸的模型句柄
pub type OnnxRuntime = ModelRuntime<TractModelBuilder, { INPUT_SIZE }>;

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("分析失败: {0}")]
  ModelLoad(#[from] ModelLoadError),
  #[error("分析失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("分析失败: {0}")]
  Inference(#[from] InferenceError),
}

/// 一次性静态图像检测（拍照或相册选图）。
///
/// 同一实例上的并发调用不做互斥，模型句柄本身需支持并发推理。
pub struct StillImagePipeline<L, const S: u32>
where
  L: ModelLoader<S>,
{
  runtime: Arc<ModelRuntime<L, S>>,
  config: PostprocessConfig,
}

impl<L, const S: u32> StillImagePipeline<L, S>
where
  L: ModelLoader<S>,
{
  pub fn new(runtime: Arc<ModelRuntime<L, S>>) -> Self {
    Self {
      runtime,
      config: PostprocessConfig::still_image(S),
    }
  }

  pub fn with_config(mut self, config: PostprocessConfig) -> Self {
    self.config = config;
    self
  }

  pub fn runtime(&self) -> &Arc<ModelRuntime<L, S>> {
    &self.runtime
  }

  /// 从文件检测：预热模型，在阻塞线程池中解码与缩放，再推理
  pub async fn detect_objects<P: AsRef<Path>>(
    &self,
    path: P,
  ) -> Result<ObjectDetectionResult, DetectError> {
    self.runtime.warmup().await?;

    let path = path.as_ref().to_path_buf();
    info!("开始分析图像: {}", path.display());
    let tensor = tokio::task::spawn_blocking(move || {
      let image = preprocess::load_image(&path)?;
      preprocess::image_to_tensor::<S>(&image)
    })
    .await
    .map_err(|e| PreprocessError::TaskAborted(e.to_string()))??;

    self.run_stages(tensor).await
  }

  /// 对已解码的图像检测
  pub async fn detect_image(
    &self,
    image: DynamicImage,
  ) -> Result<ObjectDetectionResult, DetectError> {
    self.runtime.warmup().await?;

    let tensor = tokio::task::spawn_blocking(move || preprocess::image_to_tensor::<S>(&image))
      .await
      .map_err(|e| PreprocessError::TaskAborted(e.to_string()))??;

    self.run_stages(tensor).await
  }

  /// 对已预处理的张量检测
  pub async fn detect_tensor(
    &self,
    tensor: RawTensor<S>,
  ) -> Result<ObjectDetectionResult, DetectError> {
    self.runtime.warmup().await?;
    self.run_stages(tensor).await
  }

  async fn run_stages(&self, tensor: RawTensor<S>) -> Result<ObjectDetectionResult, DetectError> {
    if preprocess::is_degenerate(&tensor) {
      info!("输入近乎纯色 (均值 {:.4})，跳过推理", tensor.mean());
      return Ok(ObjectDetectionResult::empty());
    }

    let now = std::time::Instant::now();
    let output = self
      .runtime
      .run_async(tensor)
      .await
      .inspect_err(|e| warn!("推理失败: {}", e))?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let detections = self.config.postprocess(&output)?;
    let result = ObjectDetectionResult::from_detections(detections);
    info!(
      "检测到 {} 个物体，最高置信度 {:.3}",
      result.len(),
      result.confidence
    );
    Ok(result)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// 模型尚未预热
  ModelNotReady,
  /// 近乎纯色的帧，回调收到空结果
  Degenerate,
  PreprocessFailed,
  InferenceFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
  Detected(usize),
  Skipped(SkipReason),
}

/// 逐帧检测，运行在相机帧回调所在的线程上。
///
/// 从不加载模型，也不向上报告错误：任何失败都只跳过当前帧。
/// 帧与帧之间不保留任何状态。
pub struct FramePipeline<L, const S: u32>
where
  L: ModelLoader<S>,
{
  runtime: Arc<ModelRuntime<L, S>>,
  config: PostprocessConfig,
}

impl<L, const S: u32> FramePipeline<L, S>
where
  L: ModelLoader<S>,
{
  pub fn new(runtime: Arc<ModelRuntime<L, S>>) -> Self {
    Self {
      runtime,
      config: PostprocessConfig::new(S),
    }
  }

  pub fn with_config(mut self, config: PostprocessConfig) -> Self {
    self.config = config;
    self
  }

  pub fn runtime(&self) -> &Arc<ModelRuntime<L, S>> {
    &self.runtime
  }

  pub fn process_frame<F, C>(&self, frame: &F, mut on_detections: C) -> FrameOutcome
  where
    F: CameraFrame + ?Sized,
    C: FnMut(&[Detection]),
  {
    let tensor = match preprocess::frame_to_tensor::<S, F>(frame) {
      Ok(tensor) => tensor,
      Err(e) => {
        debug!("帧预处理失败，跳过: {}", e);
        return FrameOutcome::Skipped(SkipReason::PreprocessFailed);
      }
    };

    if !self.runtime.is_ready() {
      debug!("模型尚未加载，跳过当前帧");
      return FrameOutcome::Skipped(SkipReason::ModelNotReady);
    }

    if preprocess::is_degenerate(&tensor) {
      debug!("帧近乎纯色 (均值 {:.4})，跳过推理", tensor.mean());
      on_detections(&[]);
      return FrameOutcome::Skipped(SkipReason::Degenerate);
    }

    let detections = match self
      .runtime
      .run_sync(&tensor)
      .and_then(|output| self.config.postprocess(&output))
    {
      Ok(detections) => detections,
      Err(InferenceError::NotReady) => {
        return FrameOutcome::Skipped(SkipReason::ModelNotReady);
      }
      Err(e) => {
        warn!("帧推理失败，跳过: {}", e);
        return FrameOutcome::Skipped(SkipReason::InferenceFailed);
      }
    };

    on_detections(&detections);
    FrameOutcome::Detected(detections.len())
  }
}
