// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - 基于 tract 的 ONNX 检测模型
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

use std::{path::PathBuf, sync::Arc};

use tracing::{debug, error, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RGB_CHANNELS, RawTensor},
  model::{InferenceError, Model, ModelLoadError, ModelLoader},
};

pub const ONNX_SCHEME: &str = "onnx";

const ONNX_NUM_INPUTS: usize = 1;

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

pub struct TractModel<const S: u32> {
  plan: Plan,
}

#[derive(Debug, Clone)]
enum ModelSource {
  Path(PathBuf),
  Bytes(Arc<[u8]>),
}

#[derive(Debug, Clone)]
pub struct TractModelBuilder {
  source: ModelSource,
}

impl FromUrlWithScheme for TractModelBuilder {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl FromUrl for TractModelBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Self::from_path(url.path()))
  }
}

impl TractModelBuilder {
  pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
    Self {
      source: ModelSource::Path(path.into()),
    }
  }

  /// 随应用打包的模型，直接从内存加载
  pub fn from_bytes<B: Into<Arc<[u8]>>>(bytes: B) -> Self {
    Self {
      source: ModelSource::Bytes(bytes.into()),
    }
  }

  pub fn build<const S: u32>(&self) -> Result<TractModel<S>, ModelLoadError> {
    let model_data: Arc<[u8]> = match &self.source {
      ModelSource::Path(path) => {
        info!("加载模型文件: {}", path.display());
        std::fs::read(path)?.into()
      }
      ModelSource::Bytes(bytes) => {
        info!("从内存加载模型");
        Arc::clone(bytes)
      }
    };
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let invalid = |e: TractError| {
      error!("模型解析失败: {:#}", e);
      ModelLoadError::ModelInvalid(format!("{e:#}"))
    };

    let size = S as usize;
    let mut reader = std::io::Cursor::new(&model_data[..]);
    let plan = tract_onnx::onnx()
      .model_for_read(&mut reader)
      .and_then(|model| {
        model.with_input_fact(
          0,
          InferenceFact::dt_shape(f32::datum_type(), tvec!(1, size, size, RGB_CHANNELS)),
        )
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(invalid)?;

    let num_inputs = plan.model().input_outlets().map_err(invalid)?.len();
    let num_outputs = plan.model().output_outlets().map_err(invalid)?.len();
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs != ONNX_NUM_INPUTS || num_outputs == 0 {
      error!(
        "预期模型输入数量为 {}, 实际为 {}; 输出数量为 {}",
        ONNX_NUM_INPUTS, num_inputs, num_outputs
      );
      return Err(ModelLoadError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}; 输出数量为 {}",
        ONNX_NUM_INPUTS, num_inputs, num_outputs
      )));
    }

    info!("模型加载完成");
    Ok(TractModel { plan })
  }
}

impl<const S: u32> ModelLoader<S> for TractModelBuilder {
  type Model = TractModel<S>;

  fn load(&self) -> Result<Self::Model, ModelLoadError> {
    self.build::<S>()
  }
}

impl<const S: u32> Model<S> for TractModel<S> {
  fn infer(&self, input: &RawTensor<S>) -> Result<Vec<f32>, InferenceError> {
    let runtime = |e: TractError| InferenceError::Runtime(format!("{e:#}"));

    let tensor = Tensor::from_shape(&input.shape(), input.as_slice()).map_err(runtime)?;
    let outputs = self.plan.run(tvec!(tensor.into())).map_err(runtime)?;
    let output = outputs
      .first()
      .ok_or_else(|| InferenceError::Runtime("模型没有输出".to_string()))?;
    let view = output.to_array_view::<f32>().map_err(runtime)?;
    debug!("模型输出形状: {:?}", view.shape());

    Ok(view.iter().copied().collect())
  }
}
