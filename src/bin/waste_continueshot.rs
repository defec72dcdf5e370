// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/waste_continueshot.rs - 连续帧垃圾检测
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_waste::{
  FromUrl,
  input::InputWrapper,
  model::TractModelBuilder,
  output::OutputWrapper,
  pipeline::{FramePipeline, OnnxRuntime},
  task::ContinuousTask,
};

/// 连续帧检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型，例如 onnx:///models/waste.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 帧来源，folder:///path/to/frames 或 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，log: 或 record:///path/to/dir
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let runtime = Arc::new(OnnxRuntime::new(TractModelBuilder::from_url(&args.model)?));
  let output = OutputWrapper::from_url(&args.output)?;

  // 逐帧流水线从不加载模型，必须先预热
  runtime.warmup().await?;
  let pipeline = FramePipeline::new(runtime);
  let frame_number = args.frame_number;

  tokio::task::spawn_blocking(move || {
    ContinuousTask::default()
      .with_frame_number(frame_number)
      .run_task(input.into_frames(), &pipeline, &output)
  })
  .await??;

  Ok(())
}
