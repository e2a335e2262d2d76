//! # Utility Functions Module
//!
//! Helpers for building external-tool argument lists. Paths are not
//! guaranteed to be valid UTF-8, so arguments are collected as `OsString`.

use std::ffi::OsString;

/// Renders an argument list for logging
pub fn display_args(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Macro for building ffmpeg argument vectors.
///
/// Accepts string literals, `String`s, numbers (via `to_string`) and anything
/// that is `AsRef<OsStr>` such as `&Path`. Each item is converted with
/// `OsString::from(...)` after an optional `ToString`, selected by a marker:
///
/// ```rust,ignore
/// use frame_pipeline::os_args;
///
/// let fps = 25.0;
/// let args = os_args!["-r", @fps, "-i", input_path];
/// ```
#[macro_export]
macro_rules! os_args {
    (@acc [$($done:expr),*]) => {
        ::std::vec![$($done),*]
    };
    (@acc [$($done:expr),*] @$value:expr $(, $($rest:tt)*)?) => {
        $crate::os_args!(@acc [$($done,)* ::std::ffi::OsString::from($value.to_string())] $($($rest)*)?)
    };
    (@acc [$($done:expr),*] $value:expr $(, $($rest:tt)*)?) => {
        $crate::os_args!(@acc [$($done,)* ::std::ffi::OsStr::new(&$value).to_os_string()] $($($rest)*)?)
    };
    [$($items:tt)*] => {
        $crate::os_args!(@acc [] $($items)*)
    };
}
