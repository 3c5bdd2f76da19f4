//! `ark-buffer` 提供按尺寸分级的字节缓冲池，以及构建于其上的可增长缓冲。
//!
//! # 模块定位（Why）
//! - 网络写入、日志落盘等高频 I/O 路径会反复申请短生命周期的字节存储，
//!   直接走全局分配器会放大内存管理压力；
//! - 本 crate 以固定的 2 的幂尺寸级别（1 B ~ 64 KiB）缓存可复用的内存块，
//!   并在其上提供带读写游标的 [`GrowableBuffer`]，调用方无需感知池化细节。
//!
//! # 设计概要（How）
//! - [`size_class`]：尺寸级别常量与 `O(1)` 的级别换算；
//! - [`SizeClassPool`]：每个级别一把独立的 `spin::Mutex` 保护自由链表，级别之间互不阻塞；
//! - [`GrowableBuffer`]：以带标签的所有权状态区分“池化 / 自有 / 借用”存储，
//!   在 `release` 或 `Drop` 时只把池化存储交还给来源池；
//! - `io` 模块为缓冲实现 `std::io::{Read, Write}` 与 `bytes::{Buf, BufMut}`，
//!   可作为任意字节流协作者（例如日志写入器）的落地存储。
//!
//! # 契约说明（What）
//! - “不可服务”（请求为 0 或超过 64 KiB）与“数据耗尽”均以 `None` 表达，二者都不是错误；
//! - 只有 [`SizeClassPool::put`] 的非法归还会返回 [`PutError`]，并把内存块交还调用方；
//! - 缓冲池可跨线程共享；[`GrowableBuffer`] 是单所有者的可变值，跨线程使用需外部同步。

mod error;
mod growable_buffer;
mod io;
mod pool;
pub mod size_class;

pub use error::{PutError, RejectReason};
pub use growable_buffer::{DEFAULT_CAPACITY, GrowableBuffer};
pub use pool::{ClassStats, PoolStats, SizeClassPool, get, put};
pub use size_class::{CLASS_COUNT, MAX_CLASS, MAX_SIZE};
