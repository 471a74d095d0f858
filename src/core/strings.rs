//! Purpose: Bridge host strings and fixed-width, NUL-padded text fields.
//! Exports: `read_fixed`, `decode_fixed`, `encode_fixed`.
//! Role: Read-side post-processing for fixed-width text records; write-side layout helper.
//! Invariants: A field is cut at its first NUL; a field with no NUL decodes to all `width` bytes.
//! Invariants: The scratch buffer never outlives the read that allocated it.
use crate::core::error::{Error, ErrorKind};

/// Transfers `slots.len()` fixed-width fields into a scratch buffer via
/// `transfer`, then decodes them into `slots` in order.
///
/// Host strings are (pointer, length) pairs, so the backend never writes into
/// their storage directly.
pub fn read_fixed<F>(slots: &mut [String], width: usize, transfer: F) -> Result<(), Error>
where
    F: FnOnce(&mut [u8]) -> Result<(), Error>,
{
    if width == 0 {
        return Err(Error::new(ErrorKind::LayoutMismatch).with_message("string width is zero"));
    }
    let mut scratch = vec![0u8; slots.len() * width];
    transfer(&mut scratch)?;
    decode_fixed(&scratch, width, slots)
}

/// Decodes consecutive `width`-byte fields from `buf` into `slots`.
pub fn decode_fixed(buf: &[u8], width: usize, slots: &mut [String]) -> Result<(), Error> {
    if width == 0 || buf.len() < slots.len() * width {
        return Err(Error::new(ErrorKind::LayoutMismatch).with_message(format!(
            "{} bytes cannot hold {} fields of width {width}",
            buf.len(),
            slots.len()
        )));
    }
    for (slot, field) in slots.iter_mut().zip(buf.chunks_exact(width)) {
        let end = field.iter().position(|&b| b == 0).unwrap_or(width);
        *slot = String::from_utf8_lossy(&field[..end]).into_owned();
    }
    Ok(())
}

/// Packs `strings` into the contiguous fixed-width layout a write expects.
///
/// Shorter strings are NUL-padded; a string may fill the whole field, in
/// which case it carries no terminator.
pub fn encode_fixed<S: AsRef<str>>(strings: &[S], width: usize) -> Result<Vec<u8>, Error> {
    if width == 0 {
        return Err(Error::new(ErrorKind::LayoutMismatch).with_message("string width is zero"));
    }
    let mut out = vec![0u8; strings.len() * width];
    for (index, (value, field)) in strings.iter().zip(out.chunks_exact_mut(width)).enumerate() {
        let bytes = value.as_ref().as_bytes();
        if bytes.len() > width {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "string {index} is {} bytes, field width is {width}",
                    bytes.len()
                ))
                .with_hint("Use a wider string type or shorten the value."));
        }
        if bytes.contains(&0) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("string {index} contains a NUL byte")));
        }
        field[..bytes.len()].copy_from_slice(bytes);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{decode_fixed, encode_fixed, read_fixed};
    use crate::core::error::ErrorKind;

    #[test]
    fn nul_terminates_before_padding() {
        let buf = encode_fixed(&["abc", "de"], 4).expect("encode");
        assert_eq!(buf, b"abc\0de\0\0");
        let mut slots = vec![String::new(); 2];
        decode_fixed(&buf, 4, &mut slots).expect("decode");
        assert_eq!(slots, ["abc", "de"]);
    }

    #[test]
    fn full_width_field_is_not_truncated() {
        let mut slots = vec![String::new(); 2];
        decode_fixed(b"abcdxy\0\0", 4, &mut slots).expect("decode");
        assert_eq!(slots, ["abcd", "xy"]);
    }

    #[test]
    fn interior_nul_cuts_the_field() {
        let mut slots = vec![String::new()];
        decode_fixed(b"a\0bc", 4, &mut slots).expect("decode");
        assert_eq!(slots, ["a"]);
    }

    #[test]
    fn read_fixed_sizes_scratch_by_slots() {
        let mut slots = vec![String::from("old"); 3];
        read_fixed(&mut slots, 2, |scratch| {
            assert_eq!(scratch.len(), 6);
            scratch.copy_from_slice(b"hiyo\0\0");
            Ok(())
        })
        .expect("read");
        assert_eq!(slots, ["hi", "yo", ""]);
    }

    #[test]
    fn failed_transfer_leaves_slots_untouched() {
        let mut slots = vec![String::from("keep")];
        let err = read_fixed(&mut slots, 4, |_| {
            Err(crate::core::error::Error::new(ErrorKind::Backend))
        })
        .expect_err("transfer fails");
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(slots, ["keep"]);
    }

    #[test]
    fn encode_rejects_oversized_and_nul_strings() {
        let err = encode_fixed(&["toolong"], 4).expect_err("too long");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = encode_fixed(&["a\0b"], 4).expect_err("nul");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(encode_fixed(&["abcd"], 4).expect("exact"), b"abcd");
    }
}
