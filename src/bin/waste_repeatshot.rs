// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/waste_repeatshot.rs - 单帧重复推理基准
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
  task::RepeatShotTask,
};

/// 单帧重复推理参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型，例如 onnx:///models/waste.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 帧来源，只使用第一帧
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，log: 或 record:///path/to/dir
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,

  #[arg(long, value_name = "REPEAT", default_value = "100")]
  pub repeat: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let input = InputWrapper::from_url(&args.input)?;
  let runtime = Arc::new(OnnxRuntime::new(TractModelBuilder::from_url(&args.model)?));
  let output = OutputWrapper::from_url(&args.output)?;

  runtime.warmup().await?;
  let pipeline = FramePipeline::new(runtime);
  let repeat = args.repeat;

  tokio::task::spawn_blocking(move || {
    RepeatShotTask::default()
      .with_repeat(repeat)
      .run_task(input.into_frames(), &pipeline, &output)
  })
  .await??;

  Ok(())
}
