//! 定长字段的原生字节序读写。
//!
//! 调用方负责先校验缓冲长度；越界访问视为编程错误并触发 panic。

#[inline]
pub(crate) fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([buf[at], buf[at + 1]])
}

#[inline]
pub(crate) fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
pub(crate) fn get_i32(buf: &[u8], at: usize) -> i32 {
    get_u32(buf, at) as i32
}

#[inline]
pub(crate) fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_ne_bytes(bytes)
}

#[inline]
pub(crate) fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_ne_bytes());
}

#[inline]
pub(crate) fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

#[inline]
pub(crate) fn put_i32(buf: &mut [u8], at: usize, value: i32) {
    put_u32(buf, at, value as u32);
}

#[inline]
pub(crate) fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_land_at_requested_offsets() {
        let mut buf = [0u8; 16];
        put_u16(&mut buf, 2, 0xBEEF);
        put_i32(&mut buf, 4, -7);
        put_u64(&mut buf, 8, 0x0102_0304_0506_0708);
        assert_eq!(get_u16(&buf, 2), 0xBEEF);
        assert_eq!(get_i32(&buf, 4), -7);
        assert_eq!(get_u64(&buf, 8), 0x0102_0304_0506_0708);
        assert_eq!(&buf[..2], &[0, 0]);
    }
}
