// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/runtime.rs - 共享模型句柄
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

//! 进程内唯一的模型句柄。
//!
//! 句柄在第一次成功加载时写入，此后只读；异步任务上下文与逐帧回调上下文
//! 通过 `Arc<ModelRuntime>` 共享同一个句柄。

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
  frame::RawTensor,
  model::{InferenceError, Model, ModelLoadError, ModelLoader},
};

pub struct ModelRuntime<L, const S: u32>
where
  L: ModelLoader<S>,
{
  loader: Arc<L>,
  handle: OnceCell<Arc<L::Model>>,
}

impl<L, const S: u32> ModelRuntime<L, S>
where
  L: ModelLoader<S>,
{
  pub fn new(loader: L) -> Self {
    Self {
      loader: Arc::new(loader),
      handle: OnceCell::new(),
    }
  }

  pub fn is_ready(&self) -> bool {
    self.handle.initialized()
  }

  pub fn handle(&self) -> Option<Arc<L::Model>> {
    self.handle.get().cloned()
  }

  /// 加载模型；重复或并发调用只会加载一次并返回同一个句柄。
  /// 加载失败时句柄保持为空，之后可以再次预热。
  pub async fn warmup(&self) -> Result<Arc<L::Model>, ModelLoadError> {
    let loader = Arc::clone(&self.loader);
    let model = self
      .handle
      .get_or_try_init(|| async move {
        info!("开始加载模型");
        let now = std::time::Instant::now();
        let model = tokio::task::spawn_blocking(move || loader.load())
          .await
          .map_err(|e| ModelLoadError::TaskAborted(e.to_string()))?
          .inspect_err(|e| warn!("模型加载失败: {}", e))?;
        info!("模型加载完成，耗时: {:.2?}", now.elapsed());
        Ok::<_, ModelLoadError>(Arc::new(model))
      })
      .await?;

    Ok(Arc::clone(model))
  }

  /// 在阻塞线程池中执行推理。并发调用之间不做串行化。
  pub async fn run_async(&self, input: RawTensor<S>) -> Result<Vec<f32>, InferenceError> {
    let model = self.handle().ok_or(InferenceError::NotReady)?;
    debug!("提交异步推理");
    tokio::task::spawn_blocking(move || model.infer(&input))
      .await
      .map_err(|e| InferenceError::TaskAborted(e.to_string()))?
  }

  /// 在当前线程同步推理，从不触发加载。
  pub fn run_sync(&self, input: &RawTensor<S>) -> Result<Vec<f32>, InferenceError> {
    let model = self.handle.get().ok_or(InferenceError::NotReady)?;
    model.infer(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  struct EchoModel;

  impl<const S: u32> Model<S> for EchoModel {
    fn infer(&self, input: &RawTensor<S>) -> Result<Vec<f32>, InferenceError> {
      Ok(vec![input.mean(); 12])
    }
  }

  #[derive(Default)]
  struct CountingLoader {
    attempts: AtomicUsize,
    fail_first: bool,
  }

  impl<const S: u32> ModelLoader<S> for CountingLoader {
    type Model = EchoModel;

    fn load(&self) -> Result<Self::Model, ModelLoadError> {
      let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
      std::thread::sleep(Duration::from_millis(20));
      if self.fail_first && attempt == 0 {
        return Err(ModelLoadError::ModelInvalid("broken".to_string()));
      }
      Ok(EchoModel)
    }
  }

  #[tokio::test]
  async fn concurrent_warmups_load_once() {
    let runtime = ModelRuntime::<_, 2>::new(CountingLoader::default());
    assert!(!runtime.is_ready());

    let (a, b, c) = tokio::join!(runtime.warmup(), runtime.warmup(), runtime.warmup());
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));

    let again = runtime.warmup().await.unwrap();
    assert!(Arc::ptr_eq(&a, &again));
    assert_eq!(runtime.loader.attempts.load(Ordering::SeqCst), 1);
    assert!(runtime.is_ready());
  }

  #[tokio::test]
  async fn failed_warmup_can_be_retried() {
    let runtime = ModelRuntime::<_, 2>::new(CountingLoader {
      fail_first: true,
      ..Default::default()
    });

    assert!(matches!(
      runtime.warmup().await,
      Err(ModelLoadError::ModelInvalid(_))
    ));
    assert!(!runtime.is_ready());

    assert!(runtime.warmup().await.is_ok());
    assert!(runtime.is_ready());
    assert_eq!(runtime.loader.attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn inference_requires_warmup() {
    let runtime = ModelRuntime::<_, 2>::new(CountingLoader::default());
    let tensor = RawTensor::<2>::try_from(vec![0.5; 12]).unwrap();

    assert!(matches!(runtime.run_sync(&tensor), Err(InferenceError::NotReady)));
    assert!(matches!(
      runtime.run_async(tensor.clone()).await,
      Err(InferenceError::NotReady)
    ));
    assert_eq!(runtime.loader.attempts.load(Ordering::SeqCst), 0);

    runtime.warmup().await.unwrap();
    assert_eq!(runtime.run_sync(&tensor).unwrap(), vec![0.5; 12]);
    assert_eq!(runtime.run_async(tensor).await.unwrap(), vec![0.5; 12]);
  }
}
