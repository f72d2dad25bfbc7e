// SPDX-License-Identifier: GPL-2.0

//! End-to-end scenarios over a ramfs-rooted namespace.

use std::sync::atomic::Ordering;

use kvfs::error::Error;
use kvfs::fs::dentry::dput;
use kvfs::fs::fcontext::{with_action, Action, LookupFlags};
use kvfs::fs::path::path_dispatch;
use kvfs::fs::qstr::Qstr;
use kvfs::fs::ramfs::RamFs;
use kvfs::fs::{flags::*, FsContext, Vfs, XATTR_CREATE, XATTR_REPLACE};
use kvfs::sync::Arc;
use kvfs::task::Task;

fn boot() -> (Vfs, Arc<Task>) {
	let vfs = Vfs::new();
	vfs.register_filesystem(Arc::new(RamFs)).unwrap();
	let task = vfs.mount_rootfs("ramfs").unwrap();
	(vfs, task)
}

#[test]
fn open_write_close_read_roundtrip() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/tmp", 0o755).unwrap();
	vfs.mount(&task, "none", "/tmp", "ramfs", 0, None).unwrap();

	let fd0 = vfs.open(&task, "/tmp/a", O_CREAT | O_WRONLY, 0o644).unwrap();
	assert_eq!(vfs.write(&task, fd0, b"hello").unwrap(), 5);
	vfs.close(&task, fd0).unwrap();

	let fd1 = vfs.open(&task, "/tmp/a", O_RDONLY, 0).unwrap();
	let mut buf = [0u8; 5];
	assert_eq!(vfs.read(&task, fd1, &mut buf).unwrap(), 5);
	assert_eq!(&buf, b"hello");
	vfs.close(&task, fd1).unwrap();
}

#[test]
fn rename_across_parents_keeps_inode() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/tmp", 0o755).unwrap();
	vfs.mkdir(&task, "/tmp/x", 0o755).unwrap();
	vfs.mkdir(&task, "/tmp/y", 0o755).unwrap();
	let fd = vfs.open(&task, "/tmp/x/f", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();
	let ino = vfs.stat(&task, "/tmp/x/f").unwrap().st_ino;

	vfs.rename(&task, "/tmp/x/f", "/tmp/y/g").unwrap();

	assert_eq!(vfs.stat(&task, "/tmp/x/f").unwrap_err(), Error::NoSuchEntry);
	assert_eq!(vfs.stat(&task, "/tmp/y/g").unwrap().st_ino, ino);
}

#[test]
fn dotdot_crosses_mounts_upward() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/tmp", 0o755).unwrap();
	vfs.mkdir(&task, "/tmp/m", 0o755).unwrap();
	vfs.mount(&task, "none", "/tmp/m", "ramfs", 0, None).unwrap();

	let tmp_ino = vfs.stat(&task, "/tmp").unwrap().st_ino;
	let up = vfs.stat(&task, "/tmp/m/..").unwrap();
	assert_eq!(up.st_ino, tmp_ino);
	// And the mounted root itself is a different filesystem.
	let m = vfs.stat(&task, "/tmp/m").unwrap();
	assert_ne!(m.st_ino, vfs.stat(&task, "/tmp/m/..").unwrap().st_ino);
}

#[test]
fn bind_mount_exposes_and_umount_hides() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/tmp", 0o755).unwrap();
	vfs.mkdir(&task, "/tmp/a", 0o755).unwrap();
	vfs.mkdir(&task, "/tmp/b", 0o755).unwrap();
	let fd = vfs.open(&task, "/tmp/a/x", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();

	vfs.mount(&task, "/tmp/a", "/tmp/b", "ramfs", kvfs::fs::super_block::MS_BIND, None)
		.unwrap();
	let via_a = vfs.stat(&task, "/tmp/a/x").unwrap().st_ino;
	let via_b = vfs.stat(&task, "/tmp/b/x").unwrap().st_ino;
	assert_eq!(via_a, via_b);

	vfs.umount(&task, "/tmp/b", 0).unwrap();
	assert_eq!(vfs.stat(&task, "/tmp/b/x").unwrap_err(), Error::NoSuchEntry);
	assert_eq!(vfs.stat(&task, "/tmp/a/x").unwrap().st_ino, via_a);
}

#[test]
fn lru_hit_preserves_dentry_identity() {
	let (vfs, task) = boot();
	for i in 0..10 {
		let p = format!("/n{}", i);
		let fd = vfs.open(&task, &p, O_CREAT | O_WRONLY, 0o644).unwrap();
		vfs.close(&task, fd).unwrap();
	}
	assert!(vfs.dcache.lru_len() >= 10);

	let root = vfs.root_path().unwrap();
	let first = vfs.dcache.lookup(&root.dentry, &Qstr::new("n3")).unwrap();
	let ptr = Arc::as_ptr(&first) as usize;
	dput(&vfs, &first);
	let second = vfs.dcache.lookup(&root.dentry, &Qstr::new("n3")).unwrap();
	assert_eq!(Arc::as_ptr(&second) as usize, ptr);
	dput(&vfs, &second);
	root.put(&vfs);
}

#[test]
fn concurrent_create_and_open_race_cleanly() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/tmp", 0o755).unwrap();
	let creator = task.fork(2);
	let opener = task.fork(3);

	std::thread::scope(|s| {
		let vfs_ref = &vfs;
		let c = s.spawn(move || {
			let fd = vfs_ref.open(&creator, "/tmp/new", O_CREAT | O_WRONLY, 0o644)?;
			vfs_ref.close(&creator, fd)
		});
		let o = s.spawn(move || match vfs_ref.open(&opener, "/tmp/new", O_RDONLY, 0) {
			Ok(fd) => {
				vfs_ref.close(&opener, fd).unwrap();
				Ok(())
			}
			Err(Error::NoSuchEntry) => Ok(()),
			Err(e) => Err(e),
		});
		c.join().unwrap().unwrap();
		o.join().unwrap().unwrap();
	});

	// Afterwards the name resolves for everyone.
	assert!(vfs.stat(&task, "/tmp/new").is_ok());
}

#[test]
fn empty_path_needs_the_empty_flag() {
	let (vfs, task) = boot();
	assert_eq!(vfs.stat(&task, "").unwrap_err(), Error::InvalidInput);

	let mut fctx = FsContext::new(&vfs, task.clone());
	fctx.set_path("");
	with_action(
		&mut fctx,
		Action::PathLookup,
		LookupFlags::EMPTY.bits(),
		path_dispatch,
	)
	.unwrap();
	// Succeeds at the anchor: the task's cwd, which is the root.
	let root = vfs.root_path().unwrap();
	assert!(Arc::ptr_eq(&fctx.current_dentry().unwrap(), &root.dentry));
	root.put(&vfs);
}

#[test]
fn slash_and_dotdot_stay_at_the_root() {
	let (vfs, task) = boot();
	let root_ino = vfs.stat(&task, "/").unwrap().st_ino;
	assert_eq!(vfs.stat(&task, "/..").unwrap().st_ino, root_ino);
	assert_eq!(vfs.stat(&task, "/../../..").unwrap().st_ino, root_ino);
	assert_eq!(vfs.stat(&task, "///").unwrap().st_ino, root_ino);
}

#[test]
fn symlink_budget_is_eight() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/f", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();

	vfs.symlink(&task, "/f", "/s1").unwrap();
	for i in 2..=9 {
		let target = format!("/s{}", i - 1);
		let link = format!("/s{}", i);
		vfs.symlink(&task, &target, &link).unwrap();
	}
	// Eight crossings resolve; the ninth trips the budget.
	assert!(vfs.stat(&task, "/s8").is_ok());
	assert_eq!(vfs.stat(&task, "/s9").unwrap_err(), Error::LinkLoop);
}

#[test]
fn readlink_and_nofollow_see_the_link_itself() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/target", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();
	vfs.symlink(&task, "/target", "/ln").unwrap();

	let mut buf = [0u8; 64];
	let n = vfs.readlink(&task, "/ln", &mut buf).unwrap();
	assert_eq!(&buf[..n], b"/target");

	let st = vfs.lstat(&task, "/ln").unwrap();
	assert_eq!(st.st_mode & kvfs::fs::mode::S_IFMT, kvfs::fs::mode::S_IFLNK);
	let st = vfs.stat(&task, "/ln").unwrap();
	assert_eq!(st.st_mode & kvfs::fs::mode::S_IFMT, kvfs::fs::mode::S_IFREG);

	// readlink on a non-symlink refuses.
	assert!(vfs.readlink(&task, "/target", &mut buf).is_err());
}

#[test]
fn exclusive_create_reports_existing_names() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/dup", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();
	let ino = vfs.stat(&task, "/dup").unwrap().st_ino;

	assert_eq!(
		vfs.open(&task, "/dup", O_CREAT | O_EXCL | O_WRONLY, 0o644).unwrap_err(),
		Error::AlreadyExists
	);
	// Without EXCL the existing object comes back.
	let fd = vfs.open(&task, "/dup", O_CREAT | O_RDONLY, 0).unwrap();
	let st = vfs.fstat(&task, fd).unwrap();
	assert_eq!(st.st_ino, ino);
	vfs.close(&task, fd).unwrap();
}

#[test]
fn mount_then_umount_restores_mount_count() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/mnt", 0o755).unwrap();
	let before = vfs.mounts.len();
	vfs.mount(&task, "none", "/mnt", "ramfs", 0, None).unwrap();
	assert_eq!(vfs.mounts.len(), before + 1);
	vfs.umount(&task, "/mnt", 0).unwrap();
	assert_eq!(vfs.mounts.len(), before);
}

#[test]
fn umount_busy_until_files_close() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/mnt", 0o755).unwrap();
	vfs.mount(&task, "none", "/mnt", "ramfs", 0, None).unwrap();
	let fd = vfs.open(&task, "/mnt/busy", O_CREAT | O_WRONLY, 0o644).unwrap();

	assert_eq!(vfs.umount(&task, "/mnt", 0).unwrap_err(), Error::Busy);
	vfs.close(&task, fd).unwrap();
	vfs.umount(&task, "/mnt", 0).unwrap();
	assert_eq!(vfs.stat(&task, "/mnt/busy").unwrap_err(), Error::NoSuchEntry);
}

#[test]
fn umount_requires_privilege_and_a_mountpoint() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/mnt", 0o755).unwrap();
	assert_eq!(vfs.umount(&task, "/mnt", 0).unwrap_err(), Error::InvalidInput);

	vfs.mount(&task, "none", "/mnt", "ramfs", 0, None).unwrap();
	task.euid.store(1000, Ordering::Relaxed);
	assert_eq!(vfs.umount(&task, "/mnt", 0).unwrap_err(), Error::PermissionDenied);
	task.euid.store(0, Ordering::Relaxed);
	vfs.umount(&task, "/mnt", 0).unwrap();
}

#[test]
fn open_close_leaves_fd_table_unchanged() {
	let (vfs, task) = boot();
	let before = task.fdtable.open_count();
	let fd = vfs.open(&task, "/tmpfile", O_CREAT | O_RDWR, 0o644).unwrap();
	assert_eq!(task.fdtable.open_count(), before + 1);
	vfs.close(&task, fd).unwrap();
	assert_eq!(task.fdtable.open_count(), before);
	// The slot is reusable immediately.
	let fd2 = vfs.open(&task, "/tmpfile", O_RDONLY, 0).unwrap();
	assert_eq!(fd2, fd);
	vfs.close(&task, fd2).unwrap();
}

#[test]
fn unlinked_file_stays_readable_through_open_fd() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/victim", O_CREAT | O_RDWR, 0o644).unwrap();
	assert_eq!(vfs.write(&task, fd, b"data").unwrap(), 4);
	vfs.unlink(&task, "/victim").unwrap();
	assert_eq!(vfs.stat(&task, "/victim").unwrap_err(), Error::NoSuchEntry);

	assert_eq!(vfs.lseek(&task, fd, 0, kvfs::fs::SEEK_SET).unwrap(), 0);
	let mut buf = [0u8; 4];
	assert_eq!(vfs.read(&task, fd, &mut buf).unwrap(), 4);
	assert_eq!(&buf, b"data");
	vfs.close(&task, fd).unwrap();
}

#[test]
fn lseek_formula_and_append_mode() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/seek", O_CREAT | O_RDWR, 0o644).unwrap();
	vfs.write(&task, fd, b"0123456789").unwrap();

	assert_eq!(vfs.lseek(&task, fd, 2, kvfs::fs::SEEK_SET).unwrap(), 2);
	assert_eq!(vfs.lseek(&task, fd, 3, kvfs::fs::SEEK_CUR).unwrap(), 5);
	assert_eq!(vfs.lseek(&task, fd, -4, kvfs::fs::SEEK_END).unwrap(), 6);
	assert_eq!(vfs.lseek(&task, fd, -100, kvfs::fs::SEEK_CUR).unwrap_err(), Error::InvalidInput);
	assert_eq!(vfs.lseek(&task, fd, 0, 99).unwrap_err(), Error::InvalidInput);
	vfs.close(&task, fd).unwrap();

	let fd = vfs.open(&task, "/seek", O_WRONLY | O_APPEND, 0).unwrap();
	assert_eq!(vfs.write(&task, fd, b"ab").unwrap(), 2);
	vfs.close(&task, fd).unwrap();
	assert_eq!(vfs.stat(&task, "/seek").unwrap().st_size, 12);
}

#[test]
fn directory_misuse_is_rejected() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/d", 0o755).unwrap();
	let fd = vfs.open(&task, "/plain", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();

	assert_eq!(vfs.open(&task, "/d", O_WRONLY, 0).unwrap_err(), Error::IsDirectory);
	assert_eq!(vfs.open(&task, "/plain/x", O_RDONLY, 0).unwrap_err(), Error::NotDirectory);
	assert_eq!(
		vfs.open(&task, "/plain", O_RDONLY | O_DIRECTORY, 0).unwrap_err(),
		Error::NotDirectory
	);
	assert_eq!(vfs.unlink(&task, "/d").unwrap_err(), Error::IsDirectory);
	assert_eq!(vfs.rmdir(&task, "/plain").unwrap_err(), Error::NotDirectory);
}

#[test]
fn rmdir_requires_empty_directory() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/d", 0o755).unwrap();
	vfs.mkdir(&task, "/d/sub", 0o755).unwrap();
	assert_eq!(vfs.rmdir(&task, "/d").unwrap_err(), Error::NotEmpty);
	vfs.rmdir(&task, "/d/sub").unwrap();
	vfs.rmdir(&task, "/d").unwrap();
	assert_eq!(vfs.stat(&task, "/d").unwrap_err(), Error::NoSuchEntry);
}

#[test]
fn hard_links_share_the_inode() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/orig", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.write(&task, fd, b"shared").unwrap();
	vfs.close(&task, fd).unwrap();

	vfs.link(&task, "/orig", "/other").unwrap();
	let a = vfs.stat(&task, "/orig").unwrap();
	let b = vfs.stat(&task, "/other").unwrap();
	assert_eq!(a.st_ino, b.st_ino);
	assert_eq!(a.st_nlink, 2);

	vfs.unlink(&task, "/orig").unwrap();
	let b = vfs.stat(&task, "/other").unwrap();
	assert_eq!(b.st_nlink, 1);
	let fd = vfs.open(&task, "/other", O_RDONLY, 0).unwrap();
	let mut buf = [0u8; 6];
	assert_eq!(vfs.read(&task, fd, &mut buf).unwrap(), 6);
	assert_eq!(&buf, b"shared");
	vfs.close(&task, fd).unwrap();

	vfs.mkdir(&task, "/dir", 0o755).unwrap();
	assert_eq!(vfs.link(&task, "/dir", "/dirlink").unwrap_err(), Error::PermissionDenied);
}

#[test]
fn rename_replaces_and_roundtrips() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/a", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();
	let fd = vfs.open(&task, "/b", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();
	let a_ino = vfs.stat(&task, "/a").unwrap().st_ino;

	// Replace an existing target.
	vfs.rename(&task, "/a", "/b").unwrap();
	assert_eq!(vfs.stat(&task, "/a").unwrap_err(), Error::NoSuchEntry);
	assert_eq!(vfs.stat(&task, "/b").unwrap().st_ino, a_ino);

	// And back again: full state restored.
	vfs.rename(&task, "/b", "/a").unwrap();
	assert_eq!(vfs.stat(&task, "/b").unwrap_err(), Error::NoSuchEntry);
	assert_eq!(vfs.stat(&task, "/a").unwrap().st_ino, a_ino);
}

#[test]
fn rename_refuses_directory_cycles() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/p", 0o755).unwrap();
	vfs.mkdir(&task, "/p/c", 0o755).unwrap();
	assert_eq!(
		vfs.rename(&task, "/p", "/p/c/inside").unwrap_err(),
		Error::InvalidInput
	);
}

#[test]
fn mknod_creates_device_nodes() {
	let (vfs, task) = boot();
	vfs.mknod(&task, "/null", kvfs::fs::mode::S_IFCHR | 0o666, (1 << 8) | 3)
		.unwrap();
	let st = vfs.stat(&task, "/null").unwrap();
	assert_eq!(st.st_mode & kvfs::fs::mode::S_IFMT, kvfs::fs::mode::S_IFCHR);
	assert_eq!(st.st_rdev, (1 << 8) | 3);

	assert_eq!(
		vfs.mknod(&task, "/bad", kvfs::fs::mode::S_IFDIR | 0o755, 0).unwrap_err(),
		Error::InvalidInput
	);
}

#[test]
fn xattr_family_roundtrip() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/x", O_CREAT | O_RDWR, 0o644).unwrap();

	vfs.setxattr(&task, "/x", "user.color", b"blue", 0).unwrap();
	vfs.fsetxattr(&task, fd, "user.shape", b"round", XATTR_CREATE).unwrap();
	assert_eq!(
		vfs.setxattr(&task, "/x", "user.color", b"red", XATTR_CREATE).unwrap_err(),
		Error::AlreadyExists
	);
	assert_eq!(
		vfs.setxattr(&task, "/x", "user.nope", b"v", XATTR_REPLACE).unwrap_err(),
		Error::NoSuchEntry
	);

	// Size probe, then the value.
	assert_eq!(vfs.getxattr(&task, "/x", "user.color", None).unwrap(), 4);
	let mut buf = [0u8; 16];
	let n = vfs.getxattr(&task, "/x", "user.color", Some(&mut buf)).unwrap();
	assert_eq!(&buf[..n], b"blue");
	let n = vfs.fgetxattr(&task, fd, "user.shape", Some(&mut buf)).unwrap();
	assert_eq!(&buf[..n], b"round");

	let need = vfs.listxattr(&task, "/x", None).unwrap();
	let mut list = vec![0u8; need];
	let n = vfs.listxattr(&task, "/x", Some(&mut list)).unwrap();
	let names: Vec<&[u8]> = list[..n].split(|&b| b == 0).filter(|s| !s.is_empty()).collect();
	assert_eq!(names, vec![b"user.color".as_ref(), b"user.shape".as_ref()]);

	vfs.removexattr(&task, "/x", "user.color").unwrap();
	assert_eq!(
		vfs.getxattr(&task, "/x", "user.color", None).unwrap_err(),
		Error::NoSuchEntry
	);
	assert_eq!(
		vfs.removexattr(&task, "/x", "user.color").unwrap_err(),
		Error::NoSuchEntry
	);
	vfs.close(&task, fd).unwrap();
}

#[test]
fn permissions_gate_access_for_ordinary_users() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/secret", 0o700).unwrap();
	let fd = vfs.open(&task, "/secret/file", O_CREAT | O_WRONLY, 0o600).unwrap();
	vfs.close(&task, fd).unwrap();
	let fd = vfs.open(&task, "/readable", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.close(&task, fd).unwrap();

	let user = task.fork(9);
	user.euid.store(1000, Ordering::Relaxed);
	user.egid.store(1000, Ordering::Relaxed);

	// Directory search permission blocks the walk.
	assert_eq!(
		vfs.open(&user, "/secret/file", O_RDONLY, 0).unwrap_err(),
		Error::PermissionDenied
	);
	// Mode bits block the open itself.
	assert_eq!(
		vfs.open(&user, "/readable", O_WRONLY, 0).unwrap_err(),
		Error::PermissionDenied
	);
	assert!(vfs.open(&user, "/readable", O_RDONLY, 0).is_ok());

	// Creation in a root-owned directory is refused.
	assert_eq!(
		vfs.open(&user, "/secret/new", O_CREAT | O_WRONLY, 0o644).unwrap_err(),
		Error::PermissionDenied
	);

	// chmod is owner-or-root; chown is root-only.
	assert_eq!(vfs.chmod(&user, "/readable", 0o600).unwrap_err(), Error::PermissionDenied);
	assert_eq!(vfs.chown(&user, "/readable", 5, 5).unwrap_err(), Error::PermissionDenied);
	vfs.chown(&task, "/readable", 1000, 1000).unwrap();
	vfs.chmod(&user, "/readable", 0o600).unwrap();
	let st = vfs.stat(&task, "/readable").unwrap();
	assert_eq!(st.st_mode & 0o7777, 0o600);
	assert_eq!((st.st_uid, st.st_gid), (1000, 1000));
}

#[test]
fn truncate_and_statfs_report_sizes() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/t", O_CREAT | O_RDWR, 0o644).unwrap();
	vfs.write(&task, fd, b"0123456789").unwrap();
	vfs.close(&task, fd).unwrap();

	vfs.truncate(&task, "/t", 4).unwrap();
	assert_eq!(vfs.stat(&task, "/t").unwrap().st_size, 4);

	// O_TRUNC on open drops the rest.
	let fd = vfs.open(&task, "/t", O_WRONLY | O_TRUNC, 0).unwrap();
	vfs.close(&task, fd).unwrap();
	assert_eq!(vfs.stat(&task, "/t").unwrap().st_size, 0);

	let st = vfs.statfs(&task, "/").unwrap();
	assert_eq!(st.f_type, kvfs::fs::ramfs::RAMFS_MAGIC as u64);
	assert!(st.f_files > 0);

	vfs.sync(&task, "/").unwrap();
}

#[test]
fn forked_fd_tables_are_independent() {
	let (vfs, task) = boot();
	let fd = vfs.open(&task, "/shared", O_CREAT | O_RDWR, 0o644).unwrap();
	vfs.write(&task, fd, b"abc").unwrap();

	let child = task.fork(7);
	assert_eq!(child.fdtable.open_count(), task.fdtable.open_count());

	// Closing in the child leaves the parent's descriptor alive.
	vfs.close(&child, fd).unwrap();
	assert_eq!(vfs.lseek(&task, fd, 0, kvfs::fs::SEEK_SET).unwrap(), 0);
	let mut buf = [0u8; 3];
	assert_eq!(vfs.read(&task, fd, &mut buf).unwrap(), 3);
	vfs.close(&task, fd).unwrap();
	assert_eq!(
		vfs.read(&task, fd, &mut buf).unwrap_err(),
		Error::BadFileDescriptor
	);
}

#[test]
fn pivot_root_swaps_the_process_root() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/newroot", 0o755).unwrap();
	vfs.mount(&task, "none", "/newroot", "ramfs", 0, None).unwrap();
	vfs.mkdir(&task, "/newroot/old", 0o755).unwrap();
	vfs.mkdir(&task, "/newroot/etc", 0o755).unwrap();

	vfs.pivot_root(&task, "/newroot", "/old").unwrap();

	// Absolute paths now resolve inside the new root.
	assert!(vfs.stat(&task, "/etc").is_ok());
	// The old root tree is reachable under /old.
	assert!(vfs.stat(&task, "/old/newroot").is_ok());
	// `..` at the new root stays put.
	let root_ino = vfs.stat(&task, "/").unwrap().st_ino;
	assert_eq!(vfs.stat(&task, "/..").unwrap().st_ino, root_ino);
}

#[test]
fn shrink_reclaims_and_storage_survives() {
	let (vfs, task) = boot();
	vfs.mkdir(&task, "/keep", 0o755).unwrap();
	let fd = vfs.open(&task, "/keep/data", O_CREAT | O_WRONLY, 0o644).unwrap();
	vfs.write(&task, fd, b"persistent").unwrap();
	vfs.close(&task, fd).unwrap();

	// Throw the whole cache away; the name maps re-resolve everything.
	vfs.dcache.shrink(&vfs, 0);
	let fd = vfs.open(&task, "/keep/data", O_RDONLY, 0).unwrap();
	let mut buf = [0u8; 10];
	assert_eq!(vfs.read(&task, fd, &mut buf).unwrap(), 10);
	assert_eq!(&buf, b"persistent");
	vfs.close(&task, fd).unwrap();
}
