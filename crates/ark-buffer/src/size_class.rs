//! 尺寸级别（Size Class）换算。
//!
//! 级别 `i` 对应容量恰为 `2^i` 的内存块，`i` 取值 `[0, MAX_CLASS]`。
//! 请求尺寸 `s` 落在满足 `2^i >= s` 的最小级别；`s == 0` 与 `s > MAX_SIZE` 不可服务。
//! 换算只依赖前导零计数，不做任何查表或链表搜索。

use crate::error::RejectReason;

/// 最大级别指数，`2^16 = 64 KiB`。
pub const MAX_CLASS: u32 = 16;

/// 池可服务的最大尺寸（字节）。
pub const MAX_SIZE: usize = 1 << MAX_CLASS;

/// 级别数量，覆盖 `2^0 ..= 2^MAX_CLASS`。
pub const CLASS_COUNT: usize = MAX_CLASS as usize + 1;

/// 返回 `floor(log2(value))`；`value` 为 0 时返回 0。
///
/// 例如：`floor_log2(1) == 0`、`floor_log2(3) == 1`、`floor_log2(4) == 2`。
#[inline]
pub const fn floor_log2(value: usize) -> u32 {
    if value == 0 {
        return 0;
    }
    usize::BITS - 1 - value.leading_zeros()
}

/// 级别 `class` 对应的精确容量。
#[inline]
pub const fn class_capacity(class: usize) -> usize {
    1 << class
}

/// 将请求尺寸映射到级别，超出 `[1, MAX_SIZE]` 时返回 `None`（不可服务）。
#[inline]
pub const fn class_for_request(size: usize) -> Option<usize> {
    if size == 0 || size > MAX_SIZE {
        return None;
    }
    let mut class = floor_log2(size) as usize;
    if size != class_capacity(class) {
        class += 1;
    }
    Some(class)
}

/// 校验归还内存块的容量并换算级别。
///
/// # 契约（What）
/// - 容量为 0 视为空块；
/// - 容量必须落在 `[1, MAX_SIZE]` 且恰为 2 的幂；
/// - 校验失败时返回具体原因，由调用方决定如何处置内存块。
pub fn class_for_capacity(capacity: usize) -> Result<usize, RejectReason> {
    if capacity == 0 {
        return Err(RejectReason::EmptyRegion);
    }
    if capacity > MAX_SIZE {
        return Err(RejectReason::CapacityOutOfRange { capacity });
    }
    if !capacity.is_power_of_two() {
        return Err(RejectReason::NotPowerOfTwo { capacity });
    }
    Ok(floor_log2(capacity) as usize)
}
