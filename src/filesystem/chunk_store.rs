use async_trait::async_trait;
use bytes::Bytes;
use fs4::fs_std::FileExt;
use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

use super::{
    file_name::StagedName,
    staging::{committed_file_name, create_dir, StagingArea},
};
use crate::config::{FileNameEncoding, UploadConfig};
use crate::error::{UploadError, UploadResult};

/// Payloads are copied in blocks of this size, both into fragments and out of them.
pub const BLOCK_SIZE: usize = 4096;

pub type PayloadReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where the bytes of a chunk come from.
pub enum PayloadSource {
    /// The `file` field of a multipart form.
    Multipart {
        file_name: Option<String>,
        data: Bytes,
    },
    /// The raw request body.
    RawBody(PayloadReader),
}

impl PayloadSource {
    pub fn raw(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::RawBody(Box::new(reader))
    }

    /// File name reported by the multipart part, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Multipart { file_name, .. } => file_name.as_deref(),
            Self::RawBody(_) => None,
        }
    }

    pub fn into_reader(self) -> PayloadReader {
        match self {
            Self::Multipart { data, .. } => Box::new(io::Cursor::new(data)),
            Self::RawBody(reader) => reader,
        }
    }
}

/// Everything one invocation of the uploader needs, parsed out of the request.
pub struct ChunkRequest {
    /// Client-declared file name.
    pub name: Option<String>,
    /// Zero-based position of this chunk.
    pub chunk: u32,
    /// Number of chunks in the whole upload.
    pub chunks: u32,
    /// Destination category directory.
    pub category: String,
    pub payload: PayloadSource,
}

impl ChunkRequest {
    pub fn validate(&self) -> UploadResult<()> {
        if self.chunks == 0 {
            return Err(UploadError::InvalidParameter(
                "chunks must be at least 1".to_string(),
            ));
        }
        if self.chunk >= self.chunks {
            return Err(UploadError::InvalidParameter(format!(
                "chunk {} out of range for {} chunks",
                self.chunk, self.chunks
            )));
        }
        validate_category(&self.category)
    }
}

/// Result of accepting a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk is committed; the set is not complete yet.
    ChunkAccepted {
        index: u32,
        fragment_path: PathBuf,
    },
    /// This chunk completed the set and the final file has been written.
    UploadComplete {
        final_path: PathBuf,
        disk_path: PathBuf,
    },
}

impl ChunkOutcome {
    /// Path reported back to the uploader.
    ///
    /// Built from the encoded on-disk name, so its bytes name the file that
    /// was actually written.
    pub fn public_path(&self) -> &Path {
        match self {
            Self::ChunkAccepted { fragment_path, .. } => fragment_path,
            Self::UploadComplete { final_path, .. } => final_path,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::UploadComplete { .. })
    }
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store one chunk and, if it completes its set, reassemble the final file.
    async fn accept_chunk(&self, request: ChunkRequest) -> UploadResult<ChunkOutcome>;
    /// Remove staged files older than the configured max age.
    async fn sweep_stale(&self) -> UploadResult<usize>;
}

/// Chunk store on the local filesystem.
///
/// Fragments live under `<root>/<staging_dir>`, assembled files under
/// `<root>/<category>/<YYYY-MM-DD>/`.
pub struct LocalChunkStore {
    root: PathBuf,
    staging_dir: String,
    staging: StagingArea,
    max_fragment_age: Duration,
    encoding: FileNameEncoding,
}

impl LocalChunkStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: config.root.clone(),
            staging_dir: config.staging_dir.clone(),
            staging: StagingArea::new(config.staging_path()),
            max_fragment_age: config.max_fragment_age(),
            encoding: config.file_name_encoding,
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// `<root>/<category>/<today>`, local time, matching what editors link to.
    fn destination(&self, category: &str) -> (PathBuf, PathBuf) {
        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let relative = Path::new(category).join(date);
        (self.root.join(&relative), relative)
    }

    /// Render a path under the root the way the uploader expects it back:
    /// `./<root>/...` for a bare relative root, the root as given otherwise.
    fn public_path(&self, relative: &Path) -> PathBuf {
        if self.root.is_absolute() || self.root.starts_with(".") {
            self.root.join(relative)
        } else {
            Path::new(".").join(&self.root).join(relative)
        }
    }

    #[instrument(skip(self, name, payload), fields(name = %name.display()))]
    async fn write_fragment(
        &self,
        name: &StagedName,
        index: u32,
        payload: PayloadSource,
    ) -> UploadResult<u64> {
        let writing = self.staging.writing_path(name, index);
        let committed = self.staging.committed_path(name, index);

        // no truncate until the lock is ours, a concurrent writer of the same
        // index may still be streaming into this file
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&writing)
            .map_err(|source| UploadError::StreamOpen {
                path: writing.clone(),
                source,
            })?;
        if !matches!(FileExt::try_lock_exclusive(&file), Ok(true)) {
            return Err(UploadError::LockAcquisition(writing));
        }
        // the previous lock holder may have committed this inode as `.part`
        // between our open and our lock
        if !still_linked(&file, &writing)? {
            return Err(UploadError::LockAcquisition(writing));
        }
        file.set_len(0)?;

        let mut out = tokio::fs::File::from_std(file);
        let mut reader = payload.into_reader();
        let mut buf = [0u8; BLOCK_SIZE];
        let mut written = 0u64;

        loop {
            let n = reader.read(&mut buf).await.map_err(|e| {
                UploadError::UploadValidation(format!("payload read failed: {e}"))
            })?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            written += n as u64;
        }

        out.flush().await?;
        out.sync_all().await?;
        tokio::fs::rename(&writing, &committed).await?;
        // dropping `out` closes the descriptor and releases the lock

        tracing::debug!(index, bytes = written, "Committed fragment");
        Ok(written)
    }

    /// Claim the set, fold it into the destination, then drop the fragments.
    ///
    /// Returns `None` when another invocation holds the claim or has already
    /// folded the set.
    #[instrument(skip(self, name, dest_dir), fields(name = %name.display()))]
    async fn assemble(
        &self,
        name: &StagedName,
        total: u32,
        dest_dir: &Path,
    ) -> UploadResult<Option<PathBuf>> {
        let claim_path = self.staging.claim_path(name);
        let Some(claim) = AssemblyClaim::acquire(&claim_path)? else {
            tracing::warn!(
                claim = %claim_path.display(),
                "Another request is assembling this upload"
            );
            return Ok(None);
        };

        // the winner of a previous claim may have folded and deleted the set
        if !self.staging.is_complete(name, total).await? {
            return Ok(None);
        }

        let fragments: Vec<PathBuf> = (0..total)
            .map(|index| self.staging.committed_path(name, index))
            .collect();
        let final_path = dest_dir.join(name.encoded());
        let temp_path = dest_dir.join(name.with_suffix(".assembling"));

        let target = final_path.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            fold_fragments(&fragments, &temp_path, &target)
        })
        .await
        .map_err(|e| UploadError::Io(io::Error::other(format!("spawn_blocking failed: {e}"))))??;

        drop(claim);
        tracing::info!(chunks = total, bytes, path = %final_path.display(), "Upload reassembled");
        Ok(Some(final_path))
    }
}

#[async_trait]
impl ChunkStore for LocalChunkStore {
    #[instrument(skip(self, request), fields(chunk = request.chunk, chunks = request.chunks))]
    async fn accept_chunk(&self, request: ChunkRequest) -> UploadResult<ChunkOutcome> {
        request.validate()?;

        let name = StagedName::resolve(
            request.name.as_deref(),
            request.payload.file_name(),
            self.encoding,
        )
        .map_err(|e| UploadError::InvalidParameter(e.to_string()))?;

        let (dest_dir, dest_relative) = self.destination(&request.category);
        self.staging.ensure().await?;
        create_dir(&dest_dir).await?;

        let writing = self.staging.writing_path(&name, request.chunk);
        let committed = self.staging.committed_path(&name, request.chunk);
        self.staging
            .sweep_stale(self.max_fragment_age, &[writing.as_path(), committed.as_path()])
            .await?;

        self.write_fragment(&name, request.chunk, request.payload)
            .await?;

        if self.staging.is_complete(&name, request.chunks).await? {
            if let Some(disk_path) = self.assemble(&name, request.chunks, &dest_dir).await? {
                return Ok(ChunkOutcome::UploadComplete {
                    final_path: self.public_path(&dest_relative.join(name.encoded())),
                    disk_path,
                });
            }
        }

        Ok(ChunkOutcome::ChunkAccepted {
            index: request.chunk,
            fragment_path: self.public_path(
                &Path::new(&self.staging_dir).join(committed_file_name(&name, request.chunk)),
            ),
        })
    }

    async fn sweep_stale(&self) -> UploadResult<usize> {
        self.staging.ensure().await?;
        self.staging.sweep_stale(self.max_fragment_age, &[]).await
    }
}

/// Exclusive right to reassemble one upload set, held as a marker file
/// created with `create_new`. Removed on drop.
struct AssemblyClaim {
    path: PathBuf,
}

impl AssemblyClaim {
    fn acquire(path: &Path) -> UploadResult<Option<Self>> {
        match File::options().write(true).create_new(true).open(path) {
            Ok(_) => Ok(Some(Self {
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(source) => Err(UploadError::StreamOpen {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Drop for AssemblyClaim {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release assembly claim");
        }
    }
}

/// Concatenate `fragments` in order into `final_path` through `temp_path`.
///
/// Fragments are deleted only after the destination is synced and renamed
/// into place; on any failure the temporary file is removed and every
/// fragment is left for a retry.
fn fold_fragments(fragments: &[PathBuf], temp_path: &Path, final_path: &Path) -> UploadResult<u64> {
    let out = File::options()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|source| UploadError::StreamOpen {
            path: temp_path.to_path_buf(),
            source,
        })?;

    let written = match write_locked(&out, fragments, temp_path) {
        Ok(written) => written,
        Err(e) => {
            drop(out);
            let _ = fs::remove_file(temp_path);
            return Err(e);
        }
    };
    drop(out);

    if let Err(e) = fs::rename(temp_path, final_path) {
        let _ = fs::remove_file(temp_path);
        return Err(e.into());
    }

    for fragment in fragments {
        if let Err(e) = fs::remove_file(fragment) {
            tracing::warn!(path = %fragment.display(), error = %e, "Failed to remove folded fragment");
        }
    }

    Ok(written)
}

fn write_locked(mut out: &File, fragments: &[PathBuf], temp_path: &Path) -> UploadResult<u64> {
    if !matches!(FileExt::try_lock_exclusive(out), Ok(true)) {
        return Err(UploadError::LockAcquisition(temp_path.to_path_buf()));
    }

    let mut written = 0u64;
    for fragment in fragments {
        let mut input = File::open(fragment).map_err(|source| UploadError::StreamOpen {
            path: fragment.clone(),
            source,
        })?;
        written += copy_blocks(&mut input, &mut out)?;
    }
    out.sync_all()?;
    FileExt::unlock(out)?;

    Ok(written)
}

/// True while `path` still names the inode behind `file`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> io::Result<bool> {
    // open files cannot be renamed away here, presence is enough
    path.try_exists()
}

fn copy_blocks<R: Read, W: Write>(input: &mut R, out: &mut W) -> io::Result<u64> {
    let mut buf = [0u8; BLOCK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..n])?;
        copied += n as u64;
    }
}

fn validate_category(category: &str) -> UploadResult<()> {
    let unsafe_segment = category.is_empty()
        || category == "."
        || category == ".."
        || category.contains(['/', '\\', '\0']);
    if unsafe_segment {
        return Err(UploadError::InvalidParameter(format!(
            "invalid category: {category:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UploadConfig::new(dir.path().join("uploads"), Duration::from_secs(3600));
        config.file_name_encoding = FileNameEncoding::Utf8;
        (dir, LocalChunkStore::new(&config))
    }

    fn chunk(name: &str, index: u32, total: u32, data: &'static [u8]) -> ChunkRequest {
        ChunkRequest {
            name: Some(name.to_string()),
            chunk: index,
            chunks: total,
            category: "wangEditor".to_string(),
            payload: PayloadSource::raw(data),
        }
    }

    fn staged_files(store: &LocalChunkStore) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(store.staging().dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_out_of_order_chunks_assemble_in_index_order() {
        let (_dir, store) = store();

        let first = store.accept_chunk(chunk("abc.txt", 2, 3, b"C")).await.unwrap();
        assert!(matches!(first, ChunkOutcome::ChunkAccepted { index: 2, .. }));
        assert!(first.public_path().ends_with("uploads/upload_tmp/abc.txt_2.part"));

        let second = store.accept_chunk(chunk("abc.txt", 0, 3, b"A")).await.unwrap();
        assert!(!second.is_complete());

        let last = store.accept_chunk(chunk("abc.txt", 1, 3, b"B")).await.unwrap();
        let ChunkOutcome::UploadComplete { final_path, disk_path } = last else {
            panic!("expected completed upload");
        };

        assert_eq!(fs::read(&disk_path).unwrap(), b"ABC");
        assert_eq!(final_path, disk_path);
        assert!(final_path.starts_with(store.root.join("wangEditor")));
        assert!(final_path.ends_with("abc.txt"));
        assert!(staged_files(&store).is_empty());
    }

    #[tokio::test]
    async fn test_single_chunk_completes_immediately() {
        let (_dir, store) = store();

        let outcome = store.accept_chunk(chunk("one.bin", 0, 1, b"payload")).await.unwrap();
        let ChunkOutcome::UploadComplete { disk_path, .. } = outcome else {
            panic!("expected completed upload");
        };
        assert_eq!(fs::read(disk_path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_resent_chunk_overwrites_only_its_index() {
        let (_dir, store) = store();

        store.accept_chunk(chunk("r.txt", 0, 3, b"old")).await.unwrap();
        store.accept_chunk(chunk("r.txt", 1, 3, b"-mid-")).await.unwrap();
        store.accept_chunk(chunk("r.txt", 0, 3, b"new")).await.unwrap();

        assert_eq!(staged_files(&store), vec!["r.txt_0.part", "r.txt_1.part"]);

        let outcome = store.accept_chunk(chunk("r.txt", 2, 3, b"end")).await.unwrap();
        let ChunkOutcome::UploadComplete { disk_path, .. } = outcome else {
            panic!("expected completed upload");
        };
        assert_eq!(fs::read(disk_path).unwrap(), b"new-mid-end");
    }

    #[tokio::test]
    async fn test_every_arrival_order_produces_same_file() {
        let parts: [&'static [u8]; 4] = [b"alpha-", b"", b"gamma-", b"delta"];
        let orders = permutations(&[0, 1, 2, 3]);
        assert_eq!(orders.len(), 24);

        for (run, order) in orders.iter().enumerate() {
            let (_dir, store) = store();
            let name = format!("perm-{run}.bin");
            let mut outcome = None;

            for (position, &index) in order.iter().enumerate() {
                let result = store
                    .accept_chunk(chunk(&name, index, 4, parts[index as usize]))
                    .await
                    .unwrap();
                assert_eq!(result.is_complete(), position == order.len() - 1);
                outcome = Some(result);
            }

            let Some(ChunkOutcome::UploadComplete { disk_path, .. }) = outcome else {
                panic!("order {order:?} did not complete");
            };
            assert_eq!(fs::read(disk_path).unwrap(), b"alpha-gamma-delta");
            assert!(staged_files(&store).is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_last_chunks_assemble_once() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        for index in 0..8u32 {
            if index % 2 == 0 {
                store.accept_chunk(chunk("race.bin", index, 8, b"ab")).await.unwrap();
            }
        }

        let mut handles = Vec::new();
        for index in [1u32, 3, 5, 7] {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.accept_chunk(chunk("race.bin", index, 8, b"cd")).await
            }));
        }

        let mut completed = Vec::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if let ChunkOutcome::UploadComplete { disk_path, .. } = outcome {
                completed.push(disk_path);
            }
        }

        assert_eq!(completed.len(), 1);
        let final_file = store
            .root
            .join("wangEditor")
            .join(chrono::Local::now().format("%Y-%m-%d").to_string())
            .join("race.bin");
        assert_eq!(fs::read(final_file).unwrap(), b"abcdabcdabcdabcd");
        assert!(staged_files(&store).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_of_one_index_never_rewrite_committed_fragment() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let name = StagedName::resolve(Some("same.bin"), None, FileNameEncoding::Utf8).unwrap();
        let committed = store.staging().committed_path(&name, 0);

        for round in 0..50u8 {
            let payloads: Vec<Vec<u8>> = (0..6u8)
                .map(|writer| vec![round.wrapping_mul(7).wrapping_add(writer); 20 * 1024])
                .collect();

            let mut handles = Vec::new();
            for payload in payloads.clone() {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    store
                        .accept_chunk(ChunkRequest {
                            name: Some("same.bin".to_string()),
                            chunk: 0,
                            chunks: 2,
                            category: "wangEditor".to_string(),
                            payload: PayloadSource::raw(io::Cursor::new(payload)),
                        })
                        .await
                }));
            }

            let mut accepted = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(ChunkOutcome::ChunkAccepted { index: 0, .. }) => accepted += 1,
                    Err(UploadError::LockAcquisition(_)) => {}
                    other => panic!("round {round}: unexpected result {other:?}"),
                }
            }
            assert!(accepted >= 1, "round {round}: no writer committed");

            let stored = fs::read(&committed).unwrap();
            assert!(
                payloads.contains(&stored),
                "round {round}: committed fragment is not one whole payload"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gbk_names_are_reported_as_written() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let store = LocalChunkStore::new(&UploadConfig::new(
            dir.path().join("uploads"),
            Duration::from_secs(3600),
        ));

        let first = store.accept_chunk(chunk("图.txt", 0, 2, b"A")).await.unwrap();
        assert!(first.public_path().exists());
        assert_eq!(
            first.public_path().file_name().unwrap().as_bytes(),
            b"\xcd\xbc.txt_0.part"
        );

        let last = store.accept_chunk(chunk("图.txt", 1, 2, b"B")).await.unwrap();
        let ChunkOutcome::UploadComplete { final_path, disk_path } = last else {
            panic!("expected completed upload");
        };
        assert_eq!(final_path, disk_path);
        assert_eq!(final_path.file_name().unwrap().as_bytes(), b"\xcd\xbc.txt");
        assert_eq!(fs::read(&final_path).unwrap(), b"AB");
    }

    #[tokio::test]
    async fn test_locked_fragment_is_left_alone() {
        let (_dir, store) = store();
        store.staging().ensure().await.unwrap();

        let name = StagedName::resolve(Some("busy.bin"), None, FileNameEncoding::Utf8).unwrap();
        let writing = store.staging().writing_path(&name, 0);
        let holder = File::create(&writing).unwrap();
        assert!(matches!(FileExt::try_lock_exclusive(&holder), Ok(true)));

        let err = store.accept_chunk(chunk("busy.bin", 0, 2, b"x")).await.unwrap_err();
        assert!(matches!(err, UploadError::LockAcquisition(ref path) if *path == writing));
        assert!(!store.staging().committed_path(&name, 0).exists());
    }

    #[tokio::test]
    async fn test_uncreatable_root_is_directory_creation_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        fs::write(&root, b"not a directory").unwrap();
        let store = LocalChunkStore::new(&UploadConfig::new(&root, Duration::from_secs(3600)));

        let err = store.accept_chunk(chunk("a.txt", 0, 1, b"x")).await.unwrap_err();
        assert!(matches!(err, UploadError::DirectoryCreation { .. }));
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_held_claim_defers_assembly() {
        let (_dir, store) = store();
        store.staging().ensure().await.unwrap();

        let name = StagedName::resolve(Some("held.bin"), None, FileNameEncoding::Utf8).unwrap();
        fs::write(store.staging().claim_path(&name), b"").unwrap();

        let outcome = store.accept_chunk(chunk("held.bin", 0, 1, b"x")).await.unwrap();
        assert!(!outcome.is_complete());
        assert!(store.staging().committed_path(&name, 0).exists());
    }

    #[test]
    fn test_failed_fold_keeps_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let fragments = vec![dir.path().join("f_0.part"), dir.path().join("f_1.part")];
        fs::write(&fragments[0], b"one").unwrap();
        // fragments[1] is missing

        let temp = dir.path().join("f.assembling");
        let target = dir.path().join("f");
        let err = fold_fragments(&fragments, &temp, &target).unwrap_err();

        assert!(matches!(err, UploadError::StreamOpen { .. }));
        assert!(fragments[0].exists());
        assert!(!temp.exists());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_rejects_bad_parameters() {
        let (_dir, store) = store();

        let err = store.accept_chunk(chunk("x", 3, 3, b"")).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidParameter(_)));

        let err = store.accept_chunk(chunk("x", 0, 0, b"")).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidParameter(_)));

        let mut request = chunk("x", 0, 1, b"");
        request.category = "../etc".to_string();
        let err = store.accept_chunk(request).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_stale_fragment_from_other_upload_is_swept() {
        let (_dir, store) = store();
        store.staging().ensure().await.unwrap();

        let abandoned = store.staging().dir().join("abandoned.zip_4.parttmp");
        fs::write(&abandoned, b"partial").unwrap();
        File::options()
            .write(true)
            .open(&abandoned)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(7200))
            .unwrap();

        store.accept_chunk(chunk("fresh.txt", 0, 2, b"a")).await.unwrap();

        assert!(!abandoned.exists());
        assert_eq!(staged_files(&store), vec!["fresh.txt_0.part"]);
    }

    fn permutations(items: &[u32]) -> Vec<Vec<u32>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for (i, &head) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }
}
