use core::{fmt, mem};

use tracing::{trace, warn};

use crate::pool::SizeClassPool;

/// [`GrowableBuffer::new`] 使用的默认容量（32 KiB）。
pub const DEFAULT_CAPACITY: usize = 32 * 1024;

/// 缓冲底层存储的所有权状态。
///
/// - `Empty`：没有任何存储，等价于新建的空缓冲或已释放的缓冲；
/// - `Pooled`：内存块租自 `pool`，始终保持完整级别长度，缓冲只使用前 `len` 字节；释放时原样交还同一个池；
/// - `Owned`：直接分配（池不可服务或扩容后新分配），释放时直接丢弃；
/// - `Borrowed`：包装调用方的存储，不拥有也不归还。
enum Storage<'a> {
    Empty,
    Pooled {
        region: Vec<u8>,
        len: usize,
        pool: SizeClassPool,
    },
    Owned(Vec<u8>),
    Borrowed(&'a mut [u8]),
}

impl Storage<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Empty => &[],
            Storage::Pooled { region, len, .. } => &region[..*len],
            Storage::Owned(data) => data,
            Storage::Borrowed(data) => data,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Storage::Empty => &mut [],
            Storage::Pooled { region, len, .. } => &mut region[..*len],
            Storage::Owned(data) => data,
            Storage::Borrowed(data) => data,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Storage::Empty => "empty",
            Storage::Pooled { .. } => "pooled",
            Storage::Owned(_) => "owned",
            Storage::Borrowed(_) => "borrowed",
        }
    }
}

/// `GrowableBuffer` 是带独立读写游标的可增长字节缓冲。
///
/// # 设计动机（Why）
/// - 高频写入路径希望复用 [`SizeClassPool`] 中的内存块，又不希望写入因池的尺寸上限而失败；
/// - 读写游标分离后，已消费的前缀可以通过压缩原地回收，多数场景无需重新分配。
///
/// # 架构关系（How）
/// - 可读内容恰为 `data[start..end]`，可写空间为 `data[end..]`，`data.len()` 即容量；
/// - 存储来源以 `Storage` 标签区分：只有 `Pooled` 会在 [`release`](Self::release) 或 `Drop` 时交还池，
///   `Borrowed` 的释放在类型层面就是空操作；
/// - 写入前统一调用 `grow`：已有空间足够则直接返回，否则先压缩，最后才重新分配。
///
/// # 契约说明（What）
/// - **不变量**：`0 <= start <= end <= capacity()`；
/// - **写入**：总是完整写入，不存在部分写入；
/// - **读取**：无可读数据时返回 `None`（数据耗尽哨兵），与成功读取 0 字节的 `Some(0)` 可区分；
/// - **并发**：单所有者可变值，跨线程共享需外部同步；
/// - **释放**：[`release`](Self::release) 取 `&mut self` 而非消耗 `self`：交还存储后缓冲回到空状态，
///   重复释放是空操作，缓冲仍可继续写入（此时从零容量重新增长）。释放后不存在指向已归还内存块的路径，
///   `Drop` 也会执行同样的释放。
///
/// # 风险与取舍（Trade-offs）
/// - 池化内存块归还时不清零，复用后 `data[end..]` 可能残留旧数据；所有读取都受 `end` 约束，不会越界暴露；
/// - 扩容后一律改用自有存储，原池化内存块直接丢弃，不回池。
pub struct GrowableBuffer<'a> {
    storage: Storage<'a>,
    start: usize,
    end: usize,
}

impl GrowableBuffer<'static> {
    /// 以默认容量（[`DEFAULT_CAPACITY`]）从全局池创建缓冲。
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// 以指定初始容量从全局池创建缓冲。
    pub fn with_capacity(size: usize) -> Self {
        Self::with_capacity_in(size, SizeClassPool::global())
    }

    /// 以指定初始容量从给定池创建缓冲。
    ///
    /// # 契约
    /// - `size == 0`：返回无存储的空缓冲，不触碰池；
    /// - 池可服务：存储为池化内存块，容量恰为 `size`；
    /// - 池不可服务（超过 64 KiB）：静默回退为直接分配 `size` 字节，写入路径不因此失败。
    pub fn with_capacity_in(size: usize, pool: &SizeClassPool) -> Self {
        if size == 0 {
            return Self::empty();
        }
        let storage = match pool.get_full(size) {
            Some(region) => Storage::Pooled {
                region,
                len: size,
                pool: pool.clone(),
            },
            None => {
                trace!(size, "buffer capacity above pool limit, allocating directly");
                Storage::Owned(vec![0u8; size])
            }
        };
        Self {
            storage,
            start: 0,
            end: 0,
        }
    }
}

impl<'a> GrowableBuffer<'a> {
    /// 无存储、容量为 0 的空缓冲。
    pub fn empty() -> Self {
        Self {
            storage: Storage::Empty,
            start: 0,
            end: 0,
        }
    }

    /// 零拷贝包装调用方存储：整段切片即可读内容。
    ///
    /// 缓冲与调用方共享同一块内存，通过缓冲的修改在借用结束后对调用方可见。
    /// 若后续写入需要扩容，缓冲会换用自有存储，此后不再影响调用方切片。
    pub fn wrap(data: &'a mut [u8]) -> Self {
        let end = data.len();
        Self {
            storage: Storage::Borrowed(data),
            start: 0,
            end,
        }
    }

    /// 可读字节数。
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// 是否没有可读数据。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 底层存储总容量。
    pub fn capacity(&self) -> usize {
        self.storage.as_slice().len()
    }

    /// 存储是否租自缓冲池（释放时会归还）。
    pub fn is_pooled(&self) -> bool {
        matches!(self.storage, Storage::Pooled { .. })
    }

    /// 当前可读内容。
    pub fn as_slice(&self) -> &[u8] {
        &self.storage.as_slice()[self.start..self.end]
    }

    /// 当前可读内容的可变视图。
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let (start, end) = (self.start, self.end);
        &mut self.storage.as_mut_slice()[start..end]
    }

    /// 不消费地查看前 `n` 个可读字节，`n` 超出时截断为 [`len`](Self::len)。
    pub fn to(&self, n: usize) -> &[u8] {
        let n = n.min(self.len());
        &self.as_slice()[..n]
    }

    /// 清空游标，保留容量与存储所有权。
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// 释放存储：池化存储交还来源池，随后缓冲回到无存储的空状态。
    ///
    /// 释放永不失败；归还被拒绝时只记录日志。对空缓冲、已释放缓冲或借用缓冲重复调用都是安全的空操作。
    pub fn release(&mut self) {
        let storage = mem::replace(&mut self.storage, Storage::Empty);
        self.reset();
        if let Storage::Pooled { region, pool, .. } = storage {
            if let Err(err) = pool.put(region) {
                warn!(error = %err, "pooled region could not be returned on release");
            }
        }
    }

    /// 追加写入全部字节，返回写入数量（恒等于 `src.len()`）。
    pub fn write(&mut self, src: &[u8]) -> usize {
        if src.is_empty() {
            return 0;
        }
        self.grow(src.len());
        let end = self.end;
        self.storage.as_mut_slice()[end..end + src.len()].copy_from_slice(src);
        self.end += src.len();
        src.len()
    }

    /// 追加写入单个字节。
    pub fn write_byte(&mut self, byte: u8) {
        self.grow(1);
        let end = self.end;
        self.storage.as_mut_slice()[end] = byte;
        self.end += 1;
    }

    /// 在末尾预留 `n` 字节并计入可读内容，返回该区域供调用方原地填充。
    ///
    /// 返回区域的初始内容未定义（可能是复用内存块中的旧数据），调用方应完整覆盖。
    pub fn extend(&mut self, n: usize) -> &mut [u8] {
        self.grow(n);
        let start = self.end;
        self.end += n;
        let end = self.end;
        &mut self.storage.as_mut_slice()[start..end]
    }

    /// 读取至多 `dst.len()` 个字节。
    ///
    /// 无可读数据时返回 `None`；否则返回实际复制的字节数，内容读空后游标归零以回收整段容量。
    pub fn read(&mut self, dst: &mut [u8]) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let n = dst.len().min(self.len());
        dst[..n].copy_from_slice(&self.as_slice()[..n]);
        self.consume(n);
        Some(n)
    }

    /// 读取单个字节，无可读数据时返回 `None`。
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.storage.as_slice()[self.start];
        self.consume(1);
        Some(byte)
    }

    /// 恰好读取 `n` 个字节的副本。
    ///
    /// 可读数据不足 `n` 时返回 `None` 且不消费任何内容（全有或全无）。
    pub fn read_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.len() < n {
            return None;
        }
        let out = self.as_slice()[..n].to_vec();
        self.consume(n);
        Some(out)
    }

    /// 推进读游标；读空后两个游标一起归零。
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.start += n;
        if self.start == self.end {
            self.reset();
        }
    }

    /// 当前可写空间。
    pub(crate) fn spare_capacity(&self) -> usize {
        self.capacity() - self.end
    }

    /// 可写区域 `data[end..]`。
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        let end = self.end;
        &mut self.storage.as_mut_slice()[end..]
    }

    /// 把写游标推进 `n` 字节，调用方须保证这些字节已写入且不超过可写空间。
    pub(crate) fn commit(&mut self, n: usize) {
        assert!(
            n <= self.spare_capacity(),
            "commit of {n} bytes exceeds spare capacity {}",
            self.spare_capacity()
        );
        self.end += n;
    }

    /// 确保至少有 `additional` 字节的可写空间。
    ///
    /// # 执行步骤
    /// 1. 可写空间已足够：直接返回；
    /// 2. 存在已消费前缀：把可读内容平移到偏移 0，足够则返回；
    /// 3. 重新分配：新容量取 `len + additional` 与两倍当前容量中的较大者，
    ///    复制可读内容后改用自有存储。
    pub(crate) fn grow(&mut self, additional: usize) {
        if self.spare_capacity() >= additional {
            return;
        }

        if self.start > 0 && !self.is_empty() {
            let (start, end) = (self.start, self.end);
            self.storage.as_mut_slice().copy_within(start..end, 0);
            self.end = end - start;
            self.start = 0;
            if self.spare_capacity() >= additional {
                return;
            }
        }

        let len = self.len();
        let capacity = self.capacity();
        let required = len
            .checked_add(additional)
            .unwrap_or_else(|| panic!("buffer capacity overflow: {len} + {additional}"));
        let new_capacity = required.max(capacity.saturating_mul(2));
        let mut data = vec![0u8; new_capacity];
        data[..len].copy_from_slice(self.as_slice());
        trace!(
            from = capacity,
            to = new_capacity,
            len,
            previous = self.storage.kind(),
            "buffer reallocated"
        );
        self.storage = Storage::Owned(data);
        self.start = 0;
        self.end = len;
    }
}

impl Default for GrowableBuffer<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for GrowableBuffer<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for GrowableBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("storage", &self.storage.kind())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn small_capacity_comes_from_pool() {
        let pool = SizeClassPool::new();
        let buffer = GrowableBuffer::with_capacity_in(10, &pool);
        assert!(buffer.is_pooled());
        assert_eq!(buffer.capacity(), 10);
        assert!(buffer.is_empty());
        assert_eq!(pool.statistics().class(4).map(|s| s.misses), Some(1));
    }

    #[test]
    fn capacity_above_limit_falls_back_to_direct_allocation() {
        let pool = SizeClassPool::new();
        let buffer = GrowableBuffer::with_capacity_in(crate::MAX_SIZE + 1, &pool);
        assert!(!buffer.is_pooled());
        assert_eq!(buffer.capacity(), crate::MAX_SIZE + 1);
        assert!(pool.statistics().classes.iter().all(|s| s.misses == 0));
    }

    #[test]
    fn zero_capacity_is_empty_and_unpooled() {
        let pool = SizeClassPool::new();
        let buffer = GrowableBuffer::with_capacity_in(0, &pool);
        assert!(!buffer.is_pooled());
        assert_eq!(buffer.capacity(), 0);
    }

    #[test]
    fn compaction_reclaims_consumed_prefix_without_reallocating() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(8, &pool);
        buffer.write(b"abcdefgh");
        assert_eq!(buffer.read_bytes(4).as_deref(), Some(&b"abcd"[..]));

        buffer.write(b"ijkl");
        assert!(buffer.is_pooled(), "compaction must keep the pooled region");
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.as_slice(), b"efghijkl");
    }

    #[test]
    fn reallocation_at_least_doubles_and_drops_pool_ownership() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(4, &pool);
        buffer.write(b"abcd");
        buffer.write(b"e");
        assert!(!buffer.is_pooled());
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.as_slice(), b"abcde");

        buffer.write(&[b'z'; 20]);
        assert_eq!(buffer.capacity(), 25);
        assert_eq!(buffer.len(), 25);
    }

    #[test]
    fn reallocated_region_is_not_returned_to_pool() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(2, &pool);
        buffer.write(b"abc");
        buffer.release();
        assert_eq!(pool.statistics().class(1).map(|s| s.returns), Some(0));
    }

    #[test]
    fn zero_capacity_growth_allocates_exactly_what_is_needed() {
        let mut buffer = GrowableBuffer::empty();
        buffer.write(b"xyz");
        assert_eq!(buffer.capacity(), 3);
        buffer.write_byte(b'!');
        assert_eq!(buffer.capacity(), 6);
        assert_eq!(buffer.as_slice(), b"xyz!");
    }

    #[test]
    fn draining_read_resets_cursors() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(4, &pool);
        buffer.write(b"ab");
        let mut out = [0u8; 2];
        assert_eq!(buffer.read(&mut out), Some(2));
        assert_eq!((buffer.start, buffer.end), (0, 0));
        buffer.write(b"wxyz");
        assert!(buffer.is_pooled(), "full capacity is writable again");
    }

    #[test]
    fn release_returns_pooled_region_once() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(16, &pool);
        buffer.write(b"payload");
        buffer.release();
        buffer.release();

        assert_eq!(buffer.capacity(), 0);
        assert!(!buffer.is_pooled());
        let stats = pool.statistics();
        assert_eq!(stats.class(4).map(|s| s.returns), Some(1));
        assert_eq!(stats.class(4).map(|s| s.resident), Some(1));
    }

    #[test]
    fn drop_returns_pooled_region() {
        let pool = SizeClassPool::new();
        {
            let mut buffer = GrowableBuffer::with_capacity_in(300, &pool);
            buffer.write(b"dropped");
        }
        assert_eq!(pool.statistics().class(9).map(|s| s.resident), Some(1));
    }

    #[test]
    fn released_buffer_is_usable_as_empty() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(8, &pool);
        buffer.release();
        buffer.write(b"again");
        assert_eq!(buffer.as_slice(), b"again");
        assert!(!buffer.is_pooled());
    }

    #[cfg(not(feature = "scrub-on-put"))]
    #[test]
    fn release_leaves_class_tail_untouched() {
        let pool = SizeClassPool::new();
        pool.put(vec![0xAA; 16]).expect("容量 16 合法");

        let mut buffer = GrowableBuffer::with_capacity_in(10, &pool);
        assert_eq!(buffer.capacity(), 10);
        buffer.write(&[0xBB; 10]);
        buffer.release();

        let region = pool.get(16).expect("16 字节可服务");
        assert_eq!(&region[..10], &[0xBB; 10]);
        assert_eq!(&region[10..], &[0xAA; 6], "归还时不得补零尾部字节");
    }

    #[traced_test]
    #[test]
    fn fallback_and_reallocation_are_traced() {
        let pool = SizeClassPool::new();
        let direct = GrowableBuffer::with_capacity_in(crate::MAX_SIZE + 1, &pool);
        assert!(!direct.is_pooled());
        assert!(logs_contain("buffer capacity above pool limit, allocating directly"));

        let mut buffer = GrowableBuffer::with_capacity_in(2, &pool);
        buffer.write(b"abc");
        assert!(logs_contain("buffer reallocated"));
        assert!(logs_contain("from=2"));
    }

    #[test]
    fn debug_reports_storage_kind() {
        let mut backing = *b"hi";
        let buffer = GrowableBuffer::wrap(&mut backing);
        let rendered = format!("{buffer:?}");
        assert!(rendered.contains("borrowed"), "{rendered}");
    }
}
