use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for blob storage names
    /// Flat names only: no separators, no leading dot, fixed `.enc` extension
    /// - Valid: "0190f3a2-7c4e-7d1a-9b0e-2f5c8d6a1b3c.enc", "abc.enc"
    /// - Invalid: "../x.enc", "a/b.enc", ".tmp.enc", "file.txt"
    pub static ref STORAGE_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*\.enc$").unwrap();
}
