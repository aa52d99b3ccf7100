//! End-to-end tests for the storage context: folder emulation, chunked
//! uploads, and the verified-copy protocol across redundant backends.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use mirrorfs::{
    models::{
        chunk::UploadChunkMetadata,
        entry::{BlobInfo, ObjectEntry, ObjectMeta},
    },
    services::{
        chunks::SINGLE_WRITE_LIMIT,
        context::StorageContext,
        driver::{AppendCapable, StorageDriver, StorageError, StorageResult},
        fs_driver::FsDriver,
        memory_driver::MemoryDriver,
    },
};

fn dual_memory() -> (StorageContext, MemoryDriver, MemoryDriver) {
    let alpha = MemoryDriver::new("alpha");
    let beta = MemoryDriver::new("beta");
    let ctx = StorageContext::new(
        vec![
            Arc::new(alpha.clone()) as Arc<dyn StorageDriver>,
            Arc::new(beta.clone()),
        ],
        "alpha",
    )
    .unwrap();
    (ctx, alpha, beta)
}

fn chunk_meta(path: &str, name: &str, index: u32, total: u32, size: i64) -> UploadChunkMetadata {
    UploadChunkMetadata {
        upload_id: Uuid::new_v4(),
        file_name: name.into(),
        relative_path: path.into(),
        content_type: Some("application/octet-stream".into()),
        chunk_index: index,
        total_chunks: total,
        total_file_size: size,
        image: None,
    }
}

async fn upload(ctx: &StorageContext, path: &str, name: &str, data: &[u8]) {
    let meta = chunk_meta(path, name, 0, 1, data.len() as i64);
    ctx.append_chunk(&meta, Bytes::copy_from_slice(data))
        .await
        .unwrap();
}

async fn read_all(ctx: &StorageContext, path: &str) -> Vec<u8> {
    let (_, mut reader) = ctx.open_read_stream(path).await.unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    out
}

// --- folder creation and sentinel hiding ---

#[tokio::test]
async fn create_folder_twice_leaves_one_entry() {
    let (ctx, _, _) = dual_memory();
    ctx.create_folder("/reports").await.unwrap();
    ctx.create_folder("/reports").await.unwrap();

    let root = ctx.get_folder_contents("/").await.unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].name, "reports");
    assert!(root[0].is_directory);
}

#[tokio::test]
async fn empty_folder_lists_itself_but_never_its_marker() {
    let (ctx, _, _) = dual_memory();
    ctx.create_folder("docs").await.unwrap();

    assert!(ctx.exists("docs").await.unwrap());
    assert!(ctx.get_folder_contents("docs").await.unwrap().is_empty());
}

// --- copy and rename of single files ---

#[tokio::test]
async fn copy_keeps_source_and_duplicates_content() {
    let (ctx, alpha, beta) = dual_memory();
    upload(&ctx, "", "a.txt", b"payload").await;

    ctx.copy("a.txt", "b.txt").await.unwrap();

    assert!(ctx.exists("a.txt").await.unwrap());
    assert!(ctx.exists("b.txt").await.unwrap());
    assert_eq!(read_all(&ctx, "b.txt").await, b"payload");
    for backend in [&alpha, &beta] {
        assert_eq!(backend.head("a.txt").await.unwrap().size, 7);
        assert_eq!(backend.head("b.txt").await.unwrap().size, 7);
    }
}

#[tokio::test]
async fn rename_moves_content_and_removes_source() {
    let (ctx, alpha, beta) = dual_memory();
    upload(&ctx, "", "old.txt", b"contents").await;

    ctx.rename("old.txt", "new.txt").await.unwrap();

    assert!(!ctx.exists("old.txt").await.unwrap());
    assert_eq!(read_all(&ctx, "new.txt").await, b"contents");
    for backend in [&alpha, &beta] {
        assert!(!backend.exists("old.txt").await.unwrap());
        assert!(backend.exists("new.txt").await.unwrap());
    }
}

#[tokio::test]
async fn rename_onto_existing_destination_touches_nothing() {
    let (ctx, alpha, _) = dual_memory();
    upload(&ctx, "", "src.txt", b"source bytes").await;
    upload(&ctx, "", "dst.txt", b"destination").await;
    let dst_before = alpha.head("dst.txt").await.unwrap();

    let err = ctx.rename("src.txt", "dst.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(key) if key == "dst.txt"));

    assert_eq!(read_all(&ctx, "src.txt").await, b"source bytes");
    let dst_after = alpha.head("dst.txt").await.unwrap();
    assert_eq!(dst_after.size, dst_before.size);
    assert_eq!(dst_after.meta.etag, dst_before.meta.etag);
}

// --- recursive folder rename ---

#[tokio::test]
async fn folder_rename_preserves_files_and_subfolders() {
    let (ctx, _, beta) = dual_memory();
    upload(&ctx, "tree", "one.txt", b"1").await;
    upload(&ctx, "tree/branch", "two.txt", b"22").await;
    ctx.create_folder("tree/hollow").await.unwrap();

    ctx.rename("tree", "moved").await.unwrap();

    assert!(ctx.get_folder_contents("tree").await.unwrap().is_empty());
    let moved = ctx.get_folder_contents("moved").await.unwrap();
    let files: Vec<_> = moved.iter().filter(|e| !e.is_directory).collect();
    let dirs: Vec<_> = moved.iter().filter(|e| e.is_directory).collect();
    assert_eq!(files.len(), 1);
    assert_eq!(dirs.len(), 2);

    // The empty sub-folder survived the move on every backend.
    assert!(ctx.exists("moved/hollow").await.unwrap());
    assert!(beta.exists("moved/hollow/folder.stubxx").await.unwrap());
    assert_eq!(read_all(&ctx, "moved/branch/two.txt").await, b"22");
}

// --- chunk reassembly ---

#[tokio::test]
async fn small_single_chunk_upload_stores_exact_bytes() {
    let (ctx, _, _) = dual_memory();
    upload(&ctx, "media", "blob.bin", b"0123456789").await;

    let entry = ctx.get_file("media/blob.bin").await.unwrap();
    assert_eq!(entry.size, 10);
    assert_eq!(read_all(&ctx, "media/blob.bin").await, b"0123456789");
}

#[tokio::test]
async fn large_upload_appends_chunks_in_order() {
    let (ctx, _, _) = dual_memory();
    let declared = SINGLE_WRITE_LIMIT + 9;
    let parts: [&[u8]; 3] = [b"aaa", b"bbb", b"ccc"];
    for (index, part) in parts.iter().enumerate() {
        let meta = chunk_meta("big", "huge.bin", index as u32, 3, declared);
        ctx.append_chunk(&meta, Bytes::copy_from_slice(part))
            .await
            .unwrap();
    }

    assert_eq!(read_all(&ctx, "big/huge.bin").await, b"aaabbbccc");
}

// --- multi-backend parity, including mixed backend kinds ---

#[tokio::test]
async fn fs_and_memory_backends_stay_in_parity() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(FsDriver::new("disk", dir.path()).await.unwrap());
    let mem = MemoryDriver::new("mem");
    let ctx = StorageContext::new(
        vec![
            disk.clone() as Arc<dyn StorageDriver>,
            Arc::new(mem.clone()),
        ],
        "disk",
    )
    .unwrap();

    upload(&ctx, "shared", "file.txt", b"mirrored").await;
    ctx.create_folder("shared/sub").await.unwrap();
    ctx.rename("shared/file.txt", "shared/sub/file.txt")
        .await
        .unwrap();

    let on_disk = disk.head("shared/sub/file.txt").await.unwrap();
    let in_mem = mem.head("shared/sub/file.txt").await.unwrap();
    assert_eq!(on_disk.size, in_mem.size);
    assert!(!disk.exists("shared/file.txt").await.unwrap());
    assert!(!mem.exists("shared/file.txt").await.unwrap());
}

// --- pre-flight ordering and rollback ---

#[tokio::test]
async fn preflight_conflict_aborts_before_any_copy() {
    let (ctx, alpha, beta) = dual_memory();
    upload(&ctx, "batch", "first.txt", b"1").await;
    upload(&ctx, "batch", "second.txt", b"2").await;
    // Plant a conflict for a single destination key on one backend only;
    // the whole batch must still abort with nothing copied anywhere.
    beta.put_object(
        "target/second.txt",
        Bytes::from_static(b"occupied"),
        &ObjectMeta::default(),
    )
    .await
    .unwrap();

    let err = ctx.copy("batch", "target").await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(key) if key == "target/second.txt"));

    for backend in [&alpha, &beta] {
        assert!(!backend.exists("target/first.txt").await.unwrap());
        assert!(!backend.exists("target/folder.stubxx").await.unwrap());
        assert!(backend.exists("batch/first.txt").await.unwrap());
        assert!(backend.exists("batch/second.txt").await.unwrap());
    }
}

#[tokio::test]
async fn verification_failure_rolls_back_the_failed_key() {
    let alpha = MemoryDriver::new("alpha");
    let broken = BrokenCopyDriver {
        inner: MemoryDriver::new("broken"),
    };
    let ctx = StorageContext::new(
        vec![
            Arc::new(alpha.clone()) as Arc<dyn StorageDriver>,
            Arc::new(broken.clone()),
        ],
        "alpha",
    )
    .unwrap();
    upload(&ctx, "", "doc.txt", b"irreplaceable").await;

    let err = ctx.rename("doc.txt", "moved.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::VerificationFailed(key) if key == "moved.txt"));

    // Source untouched everywhere, destination copies rolled back.
    assert!(alpha.exists("doc.txt").await.unwrap());
    assert!(broken.inner.exists("doc.txt").await.unwrap());
    assert!(!alpha.exists("moved.txt").await.unwrap());
    assert!(!broken.inner.exists("moved.txt").await.unwrap());
}

#[tokio::test]
async fn renaming_the_root_is_rejected() {
    let (ctx, _, _) = dual_memory();
    for target in ["", "/"] {
        assert!(matches!(
            ctx.rename(target, "elsewhere").await,
            Err(StorageError::InvalidArgument(_))
        ));
    }
}

#[tokio::test]
async fn renaming_a_missing_source_is_not_found() {
    let (ctx, _, _) = dual_memory();
    assert!(matches!(
        ctx.rename("ghost", "anywhere").await,
        Err(StorageError::NotFound(_))
    ));
}

// --- fan-out divergence reporting ---

#[tokio::test]
async fn fanout_failure_names_the_failing_backend() {
    let alpha = MemoryDriver::new("alpha");
    let gamma = NoAppendDriver {
        inner: MemoryDriver::new("gamma"),
    };
    let ctx = StorageContext::new(
        vec![
            Arc::new(alpha.clone()) as Arc<dyn StorageDriver>,
            Arc::new(gamma),
        ],
        "alpha",
    )
    .unwrap();

    let meta = chunk_meta("", "huge.bin", 0, 2, SINGLE_WRITE_LIMIT);
    let err = ctx
        .append_chunk(&meta, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    match err {
        StorageError::Fanout(failure) => {
            assert_eq!(failure.attempted, 2);
            assert_eq!(failure.failures.len(), 1);
            assert_eq!(failure.failures[0].0, "gamma");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

// --- capability queries ---

#[tokio::test]
async fn static_website_reaches_only_capable_backends() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(FsDriver::new("disk", dir.path()).await.unwrap());
    let mem = MemoryDriver::new("mem");
    let ctx = StorageContext::new(
        vec![disk as Arc<dyn StorageDriver>, Arc::new(mem.clone())],
        "disk",
    )
    .unwrap();

    ctx.set_static_website(true, "index.html", "404.html")
        .await
        .unwrap();
    assert!(dir.path().join(".static-website").exists());
    assert!(mem.as_static_website().is_none());
}

// --- the end-to-end scenario ---

#[tokio::test]
async fn create_upload_list_rename_scenario() {
    let (ctx, _, _) = dual_memory();
    ctx.create_folder("/a").await.unwrap();
    ctx.create_folder("/a/b").await.unwrap();
    upload(&ctx, "/a/b", "f.txt", b"ten bytes!").await;

    let a = ctx.get_folder_contents("/a").await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].name, "b");
    assert!(a[0].is_directory);
    assert!(!a[0].has_sub_directories);

    let b = ctx.get_folder_contents("/a/b").await.unwrap();
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].name, "f.txt");
    assert_eq!(b[0].size, 10);

    ctx.rename("/a/b", "/a/c").await.unwrap();
    assert!(ctx.get_folder_contents("/a/b").await.unwrap().is_empty());
    let c = ctx.get_folder_contents("/a/c").await.unwrap();
    assert_eq!(c.len(), 1);
    assert_eq!(c[0].path, "a/c/f.txt");
    assert_eq!(c[0].size, 10);
}

// --- misbehaving-backend stand-ins ---

/// Claims copies succeed without performing them, so post-copy verification
/// fails on this backend.
#[derive(Clone)]
struct BrokenCopyDriver {
    inner: MemoryDriver,
}

#[async_trait]
impl StorageDriver for BrokenCopyDriver {
    fn name(&self) -> &str {
        "broken"
    }
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }
    async fn head(&self, key: &str) -> StorageResult<BlobInfo> {
        self.inner.head(key).await
    }
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        self.inner.list(prefix).await
    }
    async fn create_folder(&self, key: &str) -> StorageResult<()> {
        self.inner.create_folder(key).await
    }
    async fn delete_if_exists(&self, key: &str) -> StorageResult<()> {
        self.inner.delete_if_exists(key).await
    }
    async fn copy_object(&self, _src: &str, _dst: &str) -> StorageResult<()> {
        Ok(())
    }
    async fn put_object(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()> {
        self.inner.put_object(key, data, meta).await
    }
    async fn open_read(&self, key: &str) -> StorageResult<Box<dyn AsyncRead + Send + Unpin>> {
        self.inner.open_read(key).await
    }
    async fn bytes_consumed(&self) -> StorageResult<i64> {
        self.inner.bytes_consumed().await
    }
    fn as_append(&self) -> Option<&dyn AppendCapable> {
        self.inner.as_append()
    }
}

/// A backend without the append capability.
#[derive(Clone)]
struct NoAppendDriver {
    inner: MemoryDriver,
}

#[async_trait]
impl StorageDriver for NoAppendDriver {
    fn name(&self) -> &str {
        "gamma"
    }
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }
    async fn head(&self, key: &str) -> StorageResult<BlobInfo> {
        self.inner.head(key).await
    }
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        self.inner.list(prefix).await
    }
    async fn create_folder(&self, key: &str) -> StorageResult<()> {
        self.inner.create_folder(key).await
    }
    async fn delete_if_exists(&self, key: &str) -> StorageResult<()> {
        self.inner.delete_if_exists(key).await
    }
    async fn copy_object(&self, src: &str, dst: &str) -> StorageResult<()> {
        self.inner.copy_object(src, dst).await
    }
    async fn put_object(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()> {
        self.inner.put_object(key, data, meta).await
    }
    async fn open_read(&self, key: &str) -> StorageResult<Box<dyn AsyncRead + Send + Unpin>> {
        self.inner.open_read(key).await
    }
    async fn bytes_consumed(&self) -> StorageResult<i64> {
        self.inner.bytes_consumed().await
    }
}
