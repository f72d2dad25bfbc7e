// SPDX-License-Identifier: GPL-2.0

//! Interned path-component names.
//!
//! A [`Qstr`] owns the component bytes together with a hash computed once
//! at construction. Superblocks with the case-insensitive capability fold
//! ASCII case into both the hash and the comparison, so the dentry cache
//! keys stay consistent for them.

use alloc::vec::Vec;
use core::fmt;

/// Interned component name with precomputed hash. Immutable.
#[derive(Clone)]
pub struct Qstr {
	bytes: Vec<u8>,
	hash: u32,
	fold_case: bool,
}

/// Hash a name, optionally folding ASCII case.
pub fn full_name_hash(bytes: &[u8], fold_case: bool) -> u32 {
	let mut hash = 0u32;
	for &b in bytes {
		let b = if fold_case { b.to_ascii_lowercase() } else { b };
		hash = hash.wrapping_mul(31).wrapping_add(b as u32);
	}
	hash
}

impl Qstr {
	/// Intern a case-sensitive name.
	pub fn new(name: &str) -> Qstr {
		Qstr::from_bytes(name.as_bytes(), false)
	}

	/// Intern a name with the given case policy.
	pub fn from_bytes(bytes: &[u8], fold_case: bool) -> Qstr {
		Qstr {
			bytes: bytes.to_vec(),
			hash: full_name_hash(bytes, fold_case),
			fold_case,
		}
	}

	/// Raw component bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// Component as UTF-8, lossy only in the sense that non-UTF-8 names
	/// fall back to an empty string (back-ends here only produce UTF-8).
	pub fn as_str(&self) -> &str {
		core::str::from_utf8(&self.bytes).unwrap_or("")
	}

	/// Length in bytes.
	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	/// True for the empty name.
	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}

	/// The precomputed hash.
	pub fn hash(&self) -> u32 {
		self.hash
	}

	/// Compare against raw bytes under this name's case policy.
	pub fn matches(&self, other: &[u8]) -> bool {
		if self.bytes.len() != other.len() {
			return false;
		}
		if self.fold_case {
			self.bytes.eq_ignore_ascii_case(other)
		} else {
			self.bytes == other
		}
	}

	/// Compare two interned names. Case folding applies when either side
	/// was interned under a folding superblock.
	pub fn equals(&self, other: &Qstr) -> bool {
		if self.fold_case || other.fold_case {
			self.bytes.eq_ignore_ascii_case(&other.bytes)
		} else {
			self.bytes == other.bytes
		}
	}
}

impl fmt::Debug for Qstr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Qstr({:?}, hash={:#x})", self.as_str(), self.hash)
	}
}

impl fmt::Display for Qstr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hash_is_stable_and_sensitive() {
		let a = Qstr::new("hello");
		let b = Qstr::new("hello");
		let c = Qstr::new("hellp");
		assert_eq!(a.hash(), b.hash());
		assert_ne!(a.hash(), c.hash());
	}

	#[test]
	fn case_folding_unifies_hash_and_compare() {
		let upper = Qstr::from_bytes(b"README", true);
		let lower = Qstr::from_bytes(b"readme", true);
		assert_eq!(upper.hash(), lower.hash());
		assert!(upper.matches(b"readme"));
		assert!(upper.equals(&lower));

		let sensitive = Qstr::from_bytes(b"README", false);
		assert!(!sensitive.matches(b"readme"));
	}

	#[test]
	fn byte_compare_requires_equal_length() {
		let q = Qstr::new("abc");
		assert!(q.matches(b"abc"));
		assert!(!q.matches(b"ab"));
		assert!(!q.matches(b"abcd"));
	}
}
