use core::{
    array, fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use std::sync::{Arc, OnceLock};

use spin::Mutex;
use tracing::{trace, warn};

use crate::{
    error::PutError,
    size_class::{self, CLASS_COUNT},
};

/// `SizeClassPool` 按 2 的幂尺寸级别缓存可复用的字节内存块。
///
/// # 模块角色（Why）
/// - 为高频 I/O 路径提供短生命周期字节存储，避免每次写入都向全局分配器申请内存；
/// - 作为 [`GrowableBuffer`](crate::GrowableBuffer) 的默认存储来源，缓冲释放时把内存块交还这里。
///
/// # 核心机制（How）
/// - 共 [`CLASS_COUNT`] 个级别，级别 `i` 只存放容量恰为 `2^i` 的内存块；
/// - 每个级别独立持有一把 `spin::Mutex<Vec<Vec<u8>>>` 作为自由链表，
///   某个级别上的争用不会阻塞其它级别；
/// - 自由链表为空时惰性分配一块零填充的新内存，池没有“耗尽”的概念，也从不主动淘汰缓存。
///
/// # 契约说明（What）
/// - **线程安全**：可在多线程间共享与克隆，克隆体共享同一组级别；
/// - **`get` 后置条件**：返回块的 `len()` 等于请求尺寸，`capacity()` 等于所属级别容量；
/// - **`put` 前置条件**：容量须为 `[1, MAX_SIZE]` 内的 2 的幂，否则原块随 [`PutError`] 交还；
/// - **所有权**：内存块在 `put` 校验通过后归池所有，直到下一次 `get` 交出前，任何代码都不得读写。
///
/// # 设计权衡（Trade-offs）
/// - 归还时只恢复长度，不清零已写入的字节，复用块可能残留上一任持有者的数据。
///   所有读取路径都受写入游标约束，因此在进程内是安全的；若缓冲要跨越信任边界，
///   应启用 `scrub-on-put` 特性让归还时整块清零；
/// - 使用自旋锁而非阻塞互斥量：临界区只有一次 `Vec::push/pop`，最坏情况仅是短暂忙等。
#[derive(Clone, Default)]
pub struct SizeClassPool {
    inner: Arc<PoolInner>,
}

impl SizeClassPool {
    /// 创建一个与全局实例相互隔离的新池。
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级默认池：首次访问时初始化，之后随进程存活，无需析构。
    pub fn global() -> &'static SizeClassPool {
        static GLOBAL: OnceLock<SizeClassPool> = OnceLock::new();
        GLOBAL.get_or_init(SizeClassPool::new)
    }

    /// 租借至少 `size` 字节的内存块。
    ///
    /// # 契约
    /// - `size` 为 0 或超过 [`MAX_SIZE`](crate::MAX_SIZE) 时返回 `None`，调用方应自行直接分配；
    /// - 否则返回长度恰为 `size` 的块，其容量保持为级别容量，后续在容量内增长无需重新分配。
    pub fn get(&self, size: usize) -> Option<Vec<u8>> {
        let mut region = self.get_full(size)?;
        region.truncate(size);
        Some(region)
    }

    /// 与 [`get`](Self::get) 相同，但返回的块保持完整级别长度（`len() == capacity()`）。
    ///
    /// 持有者只按逻辑尺寸使用前缀，归还时 `put` 无需补齐长度，也就不会触碰尾部字节。
    pub(crate) fn get_full(&self, size: usize) -> Option<Vec<u8>> {
        let class = size_class::class_for_request(size)?;
        Some(self.inner.classes[class].take(class))
    }

    /// 归还内存块。
    ///
    /// # 实现策略
    /// 1. 依据容量换算级别，校验失败则记录统计并把原块交还调用方；
    /// 2. 把长度恢复为完整容量（默认不清零内容）；
    /// 3. 压入对应级别的自由链表。
    pub fn put(&self, mut region: Vec<u8>) -> Result<(), PutError> {
        let capacity = region.capacity();
        let class = match size_class::class_for_capacity(capacity) {
            Ok(class) => class,
            Err(reason) => {
                self.inner.rejected_puts.fetch_add(1, Ordering::Relaxed);
                warn!(capacity, %reason, "size-class pool rejected region");
                return Err(PutError::new(reason, region));
            }
        };
        restore_full_length(&mut region);
        self.inner.classes[class].give(region);
        Ok(())
    }

    /// 读取各级别的统计快照。
    ///
    /// 计数器以 `Relaxed` 顺序读取，仅用于观测，不能作为同步依据。
    pub fn statistics(&self) -> PoolStats {
        let classes = self
            .inner
            .classes
            .iter()
            .enumerate()
            .map(|(class, pool)| pool.snapshot(class))
            .collect();
        PoolStats {
            classes,
            rejected_puts: self.inner.rejected_puts.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SizeClassPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeClassPool")
            .field("classes", &CLASS_COUNT)
            .field(
                "rejected_puts",
                &self.inner.rejected_puts.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// 从全局池租借内存块，等价于 `SizeClassPool::global().get(size)`。
pub fn get(size: usize) -> Option<Vec<u8>> {
    SizeClassPool::global().get(size)
}

/// 向全局池归还内存块，等价于 `SizeClassPool::global().put(region)`。
pub fn put(region: Vec<u8>) -> Result<(), PutError> {
    SizeClassPool::global().put(region)
}

/// 把已校验内存块的长度恢复为完整容量。
///
/// 长度以内已初始化的字节保持原样；`len..capacity` 区间用零补齐，
/// 因为 Rust 不允许暴露未初始化内存。`get` 交出的块截断后再归还时正是这一情形。
fn restore_full_length(region: &mut Vec<u8>) {
    #[cfg(feature = "scrub-on-put")]
    region.clear();
    let capacity = region.capacity();
    region.resize(capacity, 0);
}

struct PoolInner {
    classes: [ClassPool; CLASS_COUNT],
    rejected_puts: AtomicU64,
}

impl Default for PoolInner {
    fn default() -> Self {
        Self {
            classes: array::from_fn(|_| ClassPool::default()),
            rejected_puts: AtomicU64::new(0),
        }
    }
}

/// 单个级别的自由链表与计数器。
#[derive(Default)]
struct ClassPool {
    free_list: Mutex<Vec<Vec<u8>>>,
    metrics: ClassMetrics,
}

impl ClassPool {
    /// 优先复用缓存块，链表为空时分配一块零填充的新块。
    fn take(&self, class: usize) -> Vec<u8> {
        let reused = self.free_list.lock().pop();
        match reused {
            Some(region) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                region
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                let capacity = size_class::class_capacity(class);
                trace!(class, capacity, "size class empty, allocating fresh region");
                vec![0u8; capacity]
            }
        }
    }

    fn give(&self, region: Vec<u8>) {
        self.free_list.lock().push(region);
        self.metrics.returns.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, class: usize) -> ClassStats {
        ClassStats {
            class,
            capacity: size_class::class_capacity(class),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            returns: self.metrics.returns.load(Ordering::Relaxed),
            resident: self.free_list.lock().len(),
        }
    }
}

#[derive(Default)]
struct ClassMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
}

/// 单个级别的统计快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ClassStats {
    /// 级别指数。
    pub class: usize,
    /// 该级别内存块的精确容量。
    pub capacity: usize,
    /// 命中缓存的租借次数。
    pub hits: u64,
    /// 缓存为空、新分配内存块的租借次数。
    pub misses: u64,
    /// 成功归还的次数。
    pub returns: u64,
    /// 当前驻留在自由链表中的内存块数量。
    pub resident: usize,
}

/// 缓冲池统计快照。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// 按级别排列的统计，下标即级别指数。
    pub classes: Vec<ClassStats>,
    /// 校验失败被拒绝的归还次数。
    pub rejected_puts: u64,
}

impl PoolStats {
    /// 指定级别的统计。
    pub fn class(&self, class: usize) -> Option<&ClassStats> {
        self.classes.get(class)
    }

    /// 所有级别驻留内存块的总字节数。
    pub fn resident_bytes(&self) -> usize {
        self.classes
            .iter()
            .map(|stats| stats.capacity * stats.resident)
            .sum()
    }
}
