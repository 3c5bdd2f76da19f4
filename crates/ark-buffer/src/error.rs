//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 缓冲池边界上唯一的错误来源是非法归还：空块、容量越界、容量非 2 的幂；
//! - “不可服务”与“数据耗尽”是约定的哨兵结果，以 `Option::None` 表达，不进入本模块。
//!
//! ## 设计要求（What）
//! - 错误类型派生 `thiserror::Error`，兼容 `std::error::Error` 与 `?` 传播；
//! - 被拒绝的内存块随错误一起交还调用方，池不做任何部分保留。

use core::fmt;

use thiserror::Error;

use crate::size_class::MAX_SIZE;

/// 归还被拒绝的具体原因。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum RejectReason {
    /// 内存块没有任何底层存储（容量为 0），对应“空指针”归还。
    #[error("region has no backing storage")]
    EmptyRegion,

    /// 容量超过最大级别。
    #[error("region capacity {capacity} exceeds the {max} byte limit", max = MAX_SIZE)]
    CapacityOutOfRange { capacity: usize },

    /// 容量不是 2 的幂，无法归入任何级别。
    #[error("region capacity {capacity} is not a power of two")]
    NotPowerOfTwo { capacity: usize },
}

/// [`SizeClassPool::put`](crate::SizeClassPool::put) 的失败结果。
///
/// # 教案式说明
/// - **意图 (Why)**：非法归还属于调用方编程错误，池绝不能静默吞下；同时内存块的所有权必须回到调用方，
///   否则调用方既无法重试也无法自行释放。
/// - **契约 (What)**：`reason()` 给出拒绝原因；`into_region()` 取回原内存块，长度与内容保持归还前的样子。
/// - **设计权衡 (Trade-offs)**：`Debug` 只输出原因与容量，避免在日志中倾倒整块字节。
#[derive(Error)]
#[error("size-class pool rejected region: {reason}")]
pub struct PutError {
    reason: RejectReason,
    region: Vec<u8>,
}

impl PutError {
    pub(crate) fn new(reason: RejectReason, region: Vec<u8>) -> Self {
        Self { reason, region }
    }

    /// 拒绝原因。
    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    /// 取回被拒绝的内存块。
    pub fn into_region(self) -> Vec<u8> {
        self.region
    }
}

impl fmt::Debug for PutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("reason", &self.reason)
            .field("capacity", &self.region.capacity())
            .finish()
    }
}
