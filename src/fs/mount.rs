// SPDX-License-Identifier: GPL-2.0

//! Mount topology.
//!
//! A mount glues a superblock's root (or, for bind mounts, a distinct
//! root-dentry copy over a shared superblock) into the namespace at an
//! `attached_at` anchor: the `(parent mount, mountpoint dentry)` pair.
//! Only the global root mount has no anchor. The mount table hashes
//! mounts by their anchor so the path walker can cross mountpoints; its
//! lock is a leaf — nothing else is acquired while holding it.

use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::fs::dentry::{dget, dput, Dentry, DentryFlags};
use crate::fs::super_block::{sb_get, sb_put, SuperBlock};
use crate::fs::Vfs;
use crate::sync::{Arc, SpinLock};

/// umount flag: detach even while busy.
pub const MNT_FORCE: u32 = 1;

/// Where a mount hangs in the namespace.
#[derive(Clone)]
pub struct MountPoint {
	pub mnt: Arc<VfsMount>,
	pub dentry: Arc<Dentry>,
}

/// One node in the mount topology.
pub struct VfsMount {
	/// Superblock this mount exposes
	pub mnt_sb: Arc<SuperBlock>,
	/// Root dentry of the exposed subtree
	pub mnt_root: Arc<Dentry>,
	/// Anchor; `None` only for the global root mount
	mnt_parent: SpinLock<Option<MountPoint>>,
	mnt_flags: AtomicU32,
	mnt_count: AtomicU32,
	/// Source device or path, for diagnostics
	pub mnt_devname: String,
}

impl VfsMount {
	pub fn flags(&self) -> u32 {
		self.mnt_flags.load(Ordering::Relaxed)
	}

	pub fn count(&self) -> u32 {
		self.mnt_count.load(Ordering::Acquire)
	}

	/// The anchor this mount hangs from.
	pub fn attached_at(&self) -> Option<MountPoint> {
		self.mnt_parent.lock().clone()
	}

	pub fn is_readonly(&self) -> bool {
		self.flags() & crate::fs::super_block::MS_RDONLY != 0
	}
}

/// Take a mount reference.
pub fn mntget(mnt: &Arc<VfsMount>) -> Arc<VfsMount> {
	mnt.mnt_count.fetch_add(1, Ordering::AcqRel);
	mnt.clone()
}

/// Release a mount reference; the last one releases the mount-root dentry
/// and the superblock reference, which may tear the instance down.
pub fn mntput(vfs: &Vfs, mnt: &Arc<VfsMount>) {
	let prev = mnt.mnt_count.fetch_sub(1, Ordering::AcqRel);
	debug_assert!(prev > 0, "mntput on a dead mount");
	if prev == 1 {
		mnt.mnt_sb.remove_mount(mnt);
		dput(vfs, &mnt.mnt_root);
		sb_put(vfs, &mnt.mnt_sb);
	}
}

/// Build a mount exposing `root` on `sb`. Takes its own references on
/// both; refcount starts at 1 for the caller.
pub fn superblock_acquire_mount(
	sb: &Arc<SuperBlock>,
	root: &Arc<Dentry>,
	flags: u32,
	devname: &str,
) -> Arc<VfsMount> {
	sb_get(sb);
	let mnt = Arc::new(VfsMount {
		mnt_sb: sb.clone(),
		mnt_root: dget(root),
		mnt_parent: SpinLock::new(None),
		mnt_flags: AtomicU32::new(flags),
		mnt_count: AtomicU32::new(1),
		mnt_devname: String::from(devname),
	});
	sb.add_mount(&mnt);
	mnt
}

/// Anchor `mnt` at `(parent, mountpoint)`: flags the dentry MOUNTED and
/// enters the mount into the table. The table owns the caller's reference
/// from this point.
pub fn mount_attach(vfs: &Vfs, mnt: &Arc<VfsMount>, parent: &Arc<VfsMount>, mountpoint: &Arc<Dentry>) {
	{
		let mut anchor = mnt.mnt_parent.lock();
		*anchor = Some(MountPoint {
			mnt: mntget(parent),
			dentry: dget(mountpoint),
		});
	}
	mountpoint.set_flag(DentryFlags::MOUNTED);
	vfs.mounts.insert(mnt);
	log::debug!(
		"mount: {} attached at {:?}",
		mnt.mnt_sb.s_fstype.name(),
		mountpoint.name().as_str()
	);
}

/// Undo [`mount_attach`]: remove from the table, clear MOUNTED when no
/// other mount hangs on the dentry, release the anchor references and the
/// table's mount reference.
pub fn mount_detach(vfs: &Vfs, mnt: &Arc<VfsMount>) -> Result<()> {
	let anchor = mnt.mnt_parent.lock().take().ok_or(Error::InvalidInput)?;
	vfs.mounts.remove(mnt);
	if !vfs.mounts.any_mount_on(&anchor.dentry) {
		anchor.dentry.clear_flag(DentryFlags::MOUNTED);
	}
	log::debug!(
		"umount: {} detached from {:?}",
		mnt.mnt_sb.s_fstype.name(),
		anchor.dentry.name().as_str()
	);
	dput(vfs, &anchor.dentry);
	mntput(vfs, &anchor.mnt);
	// The table held the mount's own reference.
	mntput(vfs, mnt);
	Ok(())
}

const MOUNT_BUCKETS: usize = 64;

/// Global mount hash keyed by `(parent mount, mountpoint dentry)`.
/// Leaf lock: nothing else is acquired under a bucket.
pub struct MountTable {
	buckets: Vec<SpinLock<Vec<Arc<VfsMount>>>>,
}

impl MountTable {
	pub fn new() -> MountTable {
		let mut buckets = Vec::with_capacity(MOUNT_BUCKETS);
		for _ in 0..MOUNT_BUCKETS {
			buckets.push(SpinLock::new(Vec::new()));
		}
		MountTable { buckets }
	}

	fn key_index(parent: &Arc<VfsMount>, dentry: &Arc<Dentry>) -> usize {
		let a = Arc::as_ptr(parent) as usize;
		let b = Arc::as_ptr(dentry) as usize;
		((a >> 4).wrapping_mul(31).wrapping_add(b >> 4)) % MOUNT_BUCKETS
	}

	/// Insert an anchored mount.
	pub fn insert(&self, mnt: &Arc<VfsMount>) {
		let Some(anchor) = mnt.attached_at() else { return };
		let idx = Self::key_index(&anchor.mnt, &anchor.dentry);
		self.buckets[idx].lock().push(mnt.clone());
	}

	/// Remove a mount from the table.
	pub fn remove(&self, mnt: &Arc<VfsMount>) {
		for bucket in &self.buckets {
			let mut b = bucket.lock();
			let before = b.len();
			b.retain(|m| !Arc::ptr_eq(m, mnt));
			if b.len() != before {
				return;
			}
		}
	}

	/// Find the mount anchored at `(parent, dentry)`, with a reference.
	pub fn lookup(&self, parent: &Arc<VfsMount>, dentry: &Arc<Dentry>) -> Option<Arc<VfsMount>> {
		let idx = Self::key_index(parent, dentry);
		let bucket = self.buckets[idx].lock();
		for m in bucket.iter() {
			if let Some(anchor) = m.attached_at() {
				if Arc::ptr_eq(&anchor.mnt, parent) && Arc::ptr_eq(&anchor.dentry, dentry) {
					return Some(mntget(m));
				}
			}
		}
		None
	}

	/// True while any mount is anchored on `dentry`, under any parent.
	pub fn any_mount_on(&self, dentry: &Arc<Dentry>) -> bool {
		for bucket in &self.buckets {
			let b = bucket.lock();
			for m in b.iter() {
				if let Some(anchor) = m.attached_at() {
					if Arc::ptr_eq(&anchor.dentry, dentry) {
						return true;
					}
				}
			}
		}
		false
	}

	/// Total number of attached mounts.
	pub fn len(&self) -> usize {
		self.buckets.iter().map(|b| b.lock().len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for MountTable {
	fn default() -> Self {
		Self::new()
	}
}
