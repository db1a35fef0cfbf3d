/// Wire-format family of an obfuscated payload.
///
/// The two families differ in compression (zlib vs custom LZ77), the flag
/// byte position, the operand layout of `BUILD_REGEXP` and `TRY_PUSH`, and
/// the loop shape the compiler emits (post-test vs pre-test).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// Legacy format: leading compression flag, zlib, post-test loops.
    V1Legacy,
    /// Current format: trailing compression flag, LZ77, pre-test loops.
    V2Current,
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Version::V1Legacy => f.write_str("v1"),
            Version::V2Current => f.write_str("v2"),
        }
    }
}
