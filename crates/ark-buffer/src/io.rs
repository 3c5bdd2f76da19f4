//! 字节流适配层：让 [`GrowableBuffer`] 充当任意字节流协作者的落地存储。
//!
//! - `std::io::Write`：写入永不失败，`flush` 为空操作；
//! - `std::io::Read`：数据耗尽按标准库约定映射为 `Ok(0)`；
//! - `bytes::Buf` / `bytes::BufMut`：与编解码栈直接对接，写满时按需扩容。

use std::io;

use bytes::{Buf, BufMut, buf::UninitSlice};

use crate::growable_buffer::GrowableBuffer;

/// `chunk_mut` 在写满时至少扩出的字节数。
const MIN_CHUNK: usize = 64;

impl io::Write for GrowableBuffer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(GrowableBuffer::write(self, buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        GrowableBuffer::write(self, buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for GrowableBuffer<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(GrowableBuffer::read(self, buf).unwrap_or(0))
    }
}

impl Buf for GrowableBuffer<'_> {
    fn remaining(&self) -> usize {
        self.len()
    }

    fn chunk(&self) -> &[u8] {
        self.as_slice()
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.len(),
            "cannot advance past `remaining`: {cnt} > {}",
            self.len()
        );
        self.consume(cnt);
    }
}

// SAFETY: `chunk_mut` 只暴露 `data[end..]`，该区域全部已初始化；
// `advance_mut` 在推进前校验不超过可写空间。
unsafe impl BufMut for GrowableBuffer<'_> {
    fn remaining_mut(&self) -> usize {
        // 以可读字节计：`grow` 会先压缩掉已消费前缀，上限按压缩后的长度衡量。
        isize::MAX as usize - self.len()
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        self.commit(cnt);
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        if self.spare_capacity() == 0 {
            self.grow(MIN_CHUNK);
        }
        UninitSlice::new(self.spare_mut())
    }

    fn put_slice(&mut self, src: &[u8]) {
        GrowableBuffer::write(self, src);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use bytes::{Buf, BufMut};

    use crate::{GrowableBuffer, SizeClassPool};

    #[test]
    fn io_write_appends_everything() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(4, &pool);
        write!(buffer, "level={} msg={}", "info", "ready").expect("写入不会失败");
        buffer.flush().expect("flush 为空操作");
        assert_eq!(buffer.as_slice(), b"level=info msg=ready");
    }

    #[test]
    fn io_read_maps_end_of_data_to_zero() {
        let mut backing = *b"abc";
        let mut buffer = GrowableBuffer::wrap(&mut backing);
        let mut out = Vec::new();
        buffer.read_to_end(&mut out).expect("读取不会失败");
        assert_eq!(out, b"abc");
        let mut scratch = [0u8; 4];
        assert_eq!(Read::read(&mut buffer, &mut scratch).expect("耗尽后返回 0"), 0);
    }

    #[test]
    fn buf_mut_writes_grow_past_capacity() {
        let mut buffer = GrowableBuffer::empty();
        buffer.put_u32(0xDEAD_BEEF);
        buffer.put_u8(7);
        buffer.put_slice(b"tail");
        assert_eq!(buffer.len(), 9);

        assert_eq!(buffer.get_u32(), 0xDEAD_BEEF);
        assert_eq!(buffer.get_u8(), 7);
        assert_eq!(buffer.chunk(), b"tail");
        buffer.advance(4);
        assert!(!buffer.has_remaining());
    }

    #[test]
    fn chunk_mut_exposes_spare_region() {
        let pool = SizeClassPool::new();
        let mut buffer = GrowableBuffer::with_capacity_in(8, &pool);
        buffer.write(b"abcdefgh");
        let chunk = buffer.chunk_mut();
        assert_eq!(chunk.len(), 64);
        chunk[..2].copy_from_slice(b"ij");
        unsafe { buffer.advance_mut(2) };
        assert_eq!(buffer.as_slice(), b"abcdefghij");
        assert!(!buffer.is_pooled());
    }

    #[test]
    #[should_panic(expected = "cannot advance past `remaining`")]
    fn advancing_past_remaining_panics() {
        let mut buffer = GrowableBuffer::empty();
        buffer.write(b"ab");
        buffer.advance(3);
    }
}
