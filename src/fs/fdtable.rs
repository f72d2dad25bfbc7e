// SPDX-License-Identifier: GPL-2.0

//! Per-process file-descriptor tables and the fd-layer dispatcher.
//!
//! A table is a numbered slot map with a next-fd hint. Slots are reserved
//! with `alloc_fd` (flagged ALLOCATED, no file yet) and filled with
//! `install`; `close` releases both. The table lock is never held across
//! operations that may take dentry locks — files are released after the
//! slot surgery is done.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::fs::fcontext::{Action, FsContext};
use crate::fs::file::{file_ref, file_unref, File};
use crate::fs::Vfs;
use crate::sync::{Arc, SpinLock};

/// Slot is reserved, possibly without an installed file yet.
pub const FD_ALLOCATED: u32 = 1 << 24;

const FDTABLE_INIT_SIZE: usize = 16;
const FDTABLE_MAX_SIZE: usize = 1024;

struct FdTableInner {
	files: Vec<Option<Arc<File>>>,
	fd_flags: Vec<u32>,
	next_fd: usize,
}

impl FdTableInner {
	fn find_next(&self, start: usize) -> Option<usize> {
		(start..self.files.len())
			.find(|&i| self.files[i].is_none() && self.fd_flags[i] & FD_ALLOCATED == 0)
	}

	fn expand(&mut self, new_size: usize) {
		self.files.resize(new_size, None);
		self.fd_flags.resize(new_size, 0);
	}
}

/// Per-process fd→file slot map.
pub struct FdTable {
	inner: SpinLock<FdTableInner>,
	count: AtomicU32,
}

impl FdTable {
	pub fn new() -> Arc<FdTable> {
		Arc::new(FdTable {
			inner: SpinLock::new(FdTableInner {
				files: alloc::vec![None; FDTABLE_INIT_SIZE],
				fd_flags: alloc::vec![0; FDTABLE_INIT_SIZE],
				next_fd: 0,
			}),
			count: AtomicU32::new(1),
		})
	}

	/// Reserve the lowest free slot; grows the arrays under the table lock
	/// up to the hard cap.
	pub fn alloc_fd(&self, flags: u32) -> Result<i32> {
		let mut inner = self.inner.lock();
		let hint = inner.next_fd;
		let mut slot = inner.find_next(hint);
		if slot.is_none() {
			slot = inner.find_next(0);
		}
		let slot = match slot {
			Some(s) => s,
			None => {
				let old = inner.files.len();
				if old >= FDTABLE_MAX_SIZE {
					return Err(Error::TooManyOpenFiles);
				}
				inner.expand((old * 2).min(FDTABLE_MAX_SIZE));
				old
			}
		};
		inner.fd_flags[slot] = flags | FD_ALLOCATED;
		inner.next_fd = slot + 1;
		Ok(slot as i32)
	}

	/// Attach a file to a reserved slot.
	pub fn install(&self, fd: i32, file: Arc<File>) -> Result<()> {
		let mut inner = self.inner.lock();
		let slot = usize::try_from(fd).map_err(|_| Error::BadFileDescriptor)?;
		if slot >= inner.files.len() || inner.fd_flags[slot] & FD_ALLOCATED == 0 {
			return Err(Error::BadFileDescriptor);
		}
		if inner.files[slot].is_some() {
			return Err(Error::Busy);
		}
		inner.files[slot] = Some(file);
		Ok(())
	}

	/// Release the slot and its file; the next-fd hint moves down.
	pub fn close(&self, vfs: &Vfs, fd: i32) -> Result<()> {
		let file = {
			let mut inner = self.inner.lock();
			let slot = usize::try_from(fd).map_err(|_| Error::BadFileDescriptor)?;
			if slot >= inner.files.len() || inner.fd_flags[slot] & FD_ALLOCATED == 0 {
				return Err(Error::BadFileDescriptor);
			}
			let file = inner.files[slot].take();
			inner.fd_flags[slot] = 0;
			if slot < inner.next_fd {
				inner.next_fd = slot;
			}
			file
		};
		// The file reference is released outside the table lock.
		if let Some(file) = file {
			file_unref(vfs, &file);
		}
		Ok(())
	}

	/// Fetch the file behind a descriptor, with a reference.
	pub fn get(&self, fd: i32) -> Result<Arc<File>> {
		let inner = self.inner.lock();
		let slot = usize::try_from(fd).map_err(|_| Error::BadFileDescriptor)?;
		match inner.files.get(slot) {
			Some(Some(file)) => Ok(file_ref(file)),
			_ => Err(Error::BadFileDescriptor),
		}
	}

	/// Fork-time duplication: clone slot contents, bumping file refcounts.
	/// The copy has its own lock.
	pub fn copy(&self) -> Arc<FdTable> {
		let inner = self.inner.lock();
		let files = inner
			.files
			.iter()
			.map(|slot| slot.as_ref().map(file_ref))
			.collect();
		Arc::new(FdTable {
			inner: SpinLock::new(FdTableInner {
				files,
				fd_flags: inner.fd_flags.clone(),
				next_fd: inner.next_fd,
			}),
			count: AtomicU32::new(1),
		})
	}

	/// Per-fd flag word.
	pub fn fd_flags(&self, fd: i32) -> Result<u32> {
		let inner = self.inner.lock();
		let slot = usize::try_from(fd).map_err(|_| Error::BadFileDescriptor)?;
		if slot >= inner.files.len() || inner.files[slot].is_none() {
			return Err(Error::BadFileDescriptor);
		}
		Ok(inner.fd_flags[slot])
	}

	/// Replace a live fd's flag word; the allocation bit is preserved.
	pub fn set_fd_flags(&self, fd: i32, flags: u32) -> Result<()> {
		let mut inner = self.inner.lock();
		let slot = usize::try_from(fd).map_err(|_| Error::BadFileDescriptor)?;
		if slot >= inner.files.len() || inner.files[slot].is_none() {
			return Err(Error::BadFileDescriptor);
		}
		inner.fd_flags[slot] = flags | FD_ALLOCATED;
		Ok(())
	}

	/// Current capacity.
	pub fn size(&self) -> usize {
		self.inner.lock().files.len()
	}

	/// Number of live descriptors.
	pub fn open_count(&self) -> usize {
		self.inner.lock().files.iter().filter(|f| f.is_some()).count()
	}

	/// Reference count of the table itself (shared on clone).
	pub fn table_refs(&self) -> u32 {
		self.count.load(Ordering::Relaxed)
	}
}

/// fd-layer intent dispatcher: translate a descriptor in the context to a
/// file handle, or retire one.
pub fn fd_dispatch(fctx: &mut FsContext<'_>) -> Result<()> {
	match fctx.fc_action {
		Action::FdOpen => {
			let task = fctx.fc_task.clone().ok_or(Error::BadFileDescriptor)?;
			let file = task.fdtable.get(fctx.fc_fd)?;
			fctx.fc_file = Some(file);
			Ok(())
		}
		Action::FdClose => {
			let task = fctx.fc_task.clone().ok_or(Error::BadFileDescriptor)?;
			let file = task.fdtable.get(fctx.fc_fd)?;
			task.fdtable.close(fctx.vfs, fctx.fc_fd)?;
			// Context drop releases the lookup reference.
			fctx.fc_file = Some(file);
			Ok(())
		}
		_ => Err(Error::NotImplemented),
	}
}
