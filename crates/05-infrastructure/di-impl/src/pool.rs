//! 组件池
//!
//! 池中的实例被 `Arc` 共享，只有池自己持有时（强引用计数为 1）才算空闲。
//! 使用方丢弃实例即归还，不需要显式的签入调用。
//!
//! 池满时等待方挂在 [`ComponentPool::returned`] 上：预留的位置被归还、池被清空时立即唤醒；
//! 使用方丢弃实例无法被观察到，由等待方按轮询间隔重新检查。

use crate::scope::{next_creation_seq, Releasable};
use closure_abstractions::{Instance, PoolSize, Releaser};
use closure_common::ComponentKey;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::{Notify, OnceCell};
use tracing::{debug, warn};

struct PooledInstance {
    /// 创建序号，关闭容器时用于排序
    seq: u64,
    instance: Instance,
}

impl PooledInstance {
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.instance) == 1
    }
}

#[derive(Default)]
struct PoolState {
    instances: Vec<PooledInstance>,
    /// 正在创建、尚未入池的实例数
    reserved: usize,
}

impl PoolState {
    fn occupied(&self) -> usize {
        self.instances.len() + self.reserved
    }
}

/// 单个组件类型的实例池
pub(crate) struct ComponentPool {
    component: ComponentKey,
    size: PoolSize,
    state: Mutex<PoolState>,
    warmed: OnceCell<()>,
    releaser: Option<Releaser>,
    returned: Notify,
}

/// 一次取用的结果
pub(crate) enum PoolCheckout {
    /// 取到空闲实例
    Idle(Instance),
    /// 池未满，预留了一个新实例的位置
    Reserved(Reservation),
    /// 池已满且没有空闲实例
    Exhausted,
}

impl ComponentPool {
    pub(crate) fn new(component: ComponentKey, size: PoolSize, releaser: Option<Releaser>) -> Self {
        Self {
            component,
            size,
            state: Mutex::new(PoolState::default()),
            warmed: OnceCell::new(),
            releaser,
            returned: Notify::new(),
        }
    }

    pub(crate) fn size(&self) -> PoolSize {
        self.size
    }

    /// 首次使用的预热标记
    pub(crate) fn warm_up_cell(&self) -> &OnceCell<()> {
        &self.warmed
    }

    /// 池中出现可用位置的通知
    ///
    /// 先 `enable` 再调用 [`Self::try_acquire`]，两者之间发出的通知不会丢失。
    pub(crate) fn returned(&self) -> Notified<'_> {
        self.returned.notified()
    }

    /// 取空闲实例，没有空闲实例时尝试预留创建位置
    pub(crate) fn try_acquire(self: &Arc<Self>) -> PoolCheckout {
        let mut state = self.state.lock();

        if let Some(idle) = state.instances.iter().find(|pooled| pooled.is_idle()) {
            return PoolCheckout::Idle(idle.instance.clone());
        }

        if state.occupied() < self.size.max {
            state.reserved += 1;
            return PoolCheckout::Reserved(Reservation {
                pool: self.clone(),
                fulfilled: false,
            });
        }

        PoolCheckout::Exhausted
    }

    /// 只预留创建位置，不取空闲实例
    pub(crate) fn try_reserve(self: &Arc<Self>) -> Option<Reservation> {
        let mut state = self.state.lock();
        if state.occupied() < self.size.max {
            state.reserved += 1;
            Some(Reservation {
                pool: self.clone(),
                fulfilled: false,
            })
        } else {
            None
        }
    }

    /// 池中实例总数
    pub(crate) fn live(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// 空闲实例数
    pub(crate) fn idle(&self) -> usize {
        self.state
            .lock()
            .instances
            .iter()
            .filter(|pooled| pooled.is_idle())
            .count()
    }

    /// 清空组件池，返回池中实例数与待释放的实例
    ///
    /// 没有释放回调时只清空，不产生待释放实例。
    pub(crate) fn drain(&self) -> (usize, Vec<Releasable>) {
        let instances = std::mem::take(&mut self.state.lock().instances);
        let count = instances.len();
        self.returned.notify_waiters();

        let Some(releaser) = &self.releaser else {
            debug!("组件池 {} 已清空，共 {} 个实例", self.component, count);
            return (count, Vec::new());
        };

        let entries = instances
            .into_iter()
            .map(|pooled| {
                if !pooled.is_idle() {
                    warn!("释放仍在使用中的池实例: {}", self.component);
                }
                Releasable::with_seq(pooled.seq, releaser.clone(), pooled.instance)
            })
            .collect();

        debug!("组件池 {} 已清空，共 {} 个实例", self.component, count);
        (count, entries)
    }
}

/// 预留的创建位置
///
/// 未兑现就被丢弃时（创建失败或解析被取消）位置自动归还。
pub(crate) struct Reservation {
    pool: Arc<ComponentPool>,
    fulfilled: bool,
}

impl Reservation {
    /// 把新实例放入池中，返回交给调用方的那份引用
    pub(crate) fn fulfil(mut self, instance: Instance) -> Instance {
        let mut state = self.pool.state.lock();
        state.reserved -= 1;
        state.instances.push(PooledInstance {
            seq: next_creation_seq(),
            instance: instance.clone(),
        });
        self.fulfilled = true;
        instance
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.pool.state.lock().reserved -= 1;
            self.pool.returned.notify_waiters();
        }
    }
}
