// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务驱动循环
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

use std::{thread, time::Duration};

use tracing::{debug, info, warn};

use crate::{
  frame::CameraFrame,
  input::ImageFileInput,
  model::{Detection, ModelLoader, ObjectDetectionResult},
  output::Render,
  pipeline::{FrameOutcome, FramePipeline, StillImagePipeline},
};

/// 30 fps 相机流的单帧预算
pub const FRAME_BUDGET: Duration = Duration::from_millis(33);

/// 单张图像：预热、检测、输出
pub struct OneShotTask;

impl OneShotTask {
  pub async fn run_task<L, O, const S: u32>(
    self,
    input: ImageFileInput,
    pipeline: &StillImagePipeline<L, S>,
    output: &O,
  ) -> anyhow::Result<ObjectDetectionResult>
  where
    L: ModelLoader<S>,
    O: Render<ObjectDetectionResult>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("开始任务...");
    let now = std::time::Instant::now();
    let result = pipeline.detect_objects(input.path()).await?;
    let elapsed = now.elapsed();
    info!("检测完成，耗时: {:.2?}", elapsed);
    output.render_result(&result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(result)
  }
}

/// 同一帧重复送入逐帧流水线，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 100 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  /// 返回平均单帧耗时（去掉前两次热身）；没有任何计时则返回 `None`
  pub fn run_task<L, F, I, O, const S: u32>(
    self,
    mut input: I,
    pipeline: &FramePipeline<L, S>,
    output: &O,
  ) -> anyhow::Result<Option<Duration>>
  where
    L: ModelLoader<S>,
    F: CameraFrame,
    I: Iterator<Item = F>,
    O: Render<[Detection]>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");

    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = std::time::Instant::now();
      let mut rendered = Ok(());
      let outcome = pipeline.process_frame(&frame, |detections| {
        rendered = output.render_result(detections);
      });
      rendered?;
      let elapsed = now.elapsed();
      debug!("({}) {:?}，耗时: {:.2?}", i, outcome, elapsed);
      times.push(elapsed);
    }

    let warm = if times.len() > 2 { &times[2..] } else { &times[..] };
    if warm.is_empty() {
      return Ok(None);
    }
    let average = warm.iter().sum::<Duration>() / warm.len() as u32;
    if average > FRAME_BUDGET {
      warn!("平均单帧耗时: {:.2?}，超出帧预算 {:.2?}", average, FRAME_BUDGET);
    } else {
      info!("平均单帧耗时: {:.2?}，帧预算 {:.2?}", average, FRAME_BUDGET);
    }

    Ok(Some(average))
  }
}

/// 连续帧：逐帧检测直到输入耗尽、达到帧数或收到 Ctrl-C
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 返回已处理的帧数
  pub fn run_task<L, F, I, O, const S: u32>(
    self,
    input: I,
    pipeline: &FramePipeline<L, S>,
    output: &O,
  ) -> anyhow::Result<usize>
  where
    L: ModelLoader<S>,
    F: CameraFrame,
    I: Iterator<Item = F>,
    O: Render<[Detection]>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    // 每个进程只能注册一次
    if let Err(e) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    }) {
      warn!("无法注册 Ctrl-C 处理器: {}", e);
    }

    let mut frame_index = 0;
    let mut detected = 0;
    for frame in input {
      frame_index += 1;
      let now = std::time::Instant::now();
      let mut rendered = Ok(());
      let outcome = pipeline.process_frame(&frame, |detections| {
        rendered = output.render_result(detections);
      });
      rendered?;
      if let FrameOutcome::Detected(n) = outcome {
        detected += n;
      }
      debug!("第 {} 帧: {:?}，耗时: {:.2?}", frame_index, outcome, now.elapsed());

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧，检测到 {} 个目标", frame_index, detected);
    Ok(frame_index)
  }
}
