// SPDX-License-Identifier: GPL-2.0

//! Open-file handles.
//!
//! A file couples a resolved `(dentry, mount)` pair with the inode, the
//! access mode, and the position. Position updates happen under the
//! handle's spinlock, which totally orders read/write/seek on one
//! descriptor.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::fs::inode::{iget, iput, Inode};
use crate::fs::mount::mntput;
use crate::fs::path::Path;
use crate::fs::super_block::{sb_get, sb_put};
use crate::fs::{flags, Vfs};
use crate::sync::{Arc, SpinLock};

bitflags::bitflags! {
	/// Access mode of an open handle.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct FileMode: u32 {
		const READ  = 1;
		const WRITE = 2;
	}
}

/// Internal flag: lseek must be forwarded to the back-end.
pub const F_SPECIAL_SEEK: u32 = 0x1000_0000;

/// An open file.
pub struct File {
	/// Resolved path pinning the dentry and mount
	pub f_path: Path,
	/// Inode behind the path
	pub f_inode: Arc<Inode>,
	/// Access mode
	pub f_mode: FileMode,
	/// Open flags plus internal bits
	pub f_flags: AtomicU32,
	/// Current position, under the handle lock
	pub f_pos: SpinLock<i64>,
	f_count: AtomicU32,
}

impl core::fmt::Debug for File {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("File")
			.field("f_mode", &self.f_mode)
			.field("f_flags", &self.f_flags.load(Ordering::Acquire))
			.field("f_count", &self.f_count.load(Ordering::Acquire))
			.finish()
	}
}

impl File {
	/// Current reference count.
	pub fn count(&self) -> u32 {
		self.f_count.load(Ordering::Acquire)
	}

	pub fn is_readable(&self) -> bool {
		self.f_mode.contains(FileMode::READ)
	}

	pub fn is_writable(&self) -> bool {
		self.f_mode.contains(FileMode::WRITE)
	}

	/// Position snapshot.
	pub fn pos(&self) -> i64 {
		*self.f_pos.lock()
	}
}

/// Decode the access mode out of open flags.
pub fn open_flags_to_mode(open_flags: u32) -> FileMode {
	match open_flags & flags::O_ACCMODE {
		flags::O_RDONLY => FileMode::READ,
		flags::O_WRONLY => FileMode::WRITE,
		_ => FileMode::READ | FileMode::WRITE,
	}
}

/// Build a handle over an already-resolved path. Consumes the path's
/// references; takes its own on the inode and the superblock (open files
/// keep their filesystem instance alive).
pub fn file_open_path(path: Path, open_flags: u32) -> crate::error::Result<Arc<File>> {
	let inode = match path.dentry.inode() {
		Some(i) => i,
		None => return Err(crate::error::Error::NoSuchEntry),
	};
	iget(&inode);
	sb_get(&inode.i_sb);
	Ok(Arc::new(File {
		f_path: path,
		f_inode: inode,
		f_mode: open_flags_to_mode(open_flags),
		f_flags: AtomicU32::new(open_flags),
		f_pos: SpinLock::new(0),
		f_count: AtomicU32::new(1),
	}))
}

/// Take a file reference.
pub fn file_ref(file: &Arc<File>) -> Arc<File> {
	file.f_count.fetch_add(1, Ordering::AcqRel);
	file.clone()
}

/// Release a file reference; the last one unpins the path, the inode, and
/// the superblock.
pub fn file_unref(vfs: &Vfs, file: &Arc<File>) {
	let prev = file.f_count.fetch_sub(1, Ordering::AcqRel);
	debug_assert!(prev > 0, "file_unref on a dead file");
	if prev == 1 {
		let sb = file.f_inode.i_sb.clone();
		iput(vfs, &file.f_inode);
		crate::fs::dentry::dput(vfs, &file.f_path.dentry);
		mntput(vfs, &file.f_path.mnt);
		sb_put(vfs, &sb);
	}
}
