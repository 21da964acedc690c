use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Builder;
use tempfile::TempDir;

/// アーカイブのファイル名
pub const CONTEXT_ARCHIVE_NAME: &str = "docker-context.tar.gz";

/// 一時ディレクトリに書き出されたビルドコンテキスト
///
/// 所有者がディレクトリの削除に責任を持つ。`close()` で明示的に削除するか、
/// drop 時に削除される。
#[derive(Debug)]
pub struct ContextArchive {
    dir: TempDir,
    path: PathBuf,
    size: u64,
}

impl ContextArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 一時ディレクトリを削除
    pub fn close(self) -> Result<()> {
        let dir = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            BuildError::Archive(format!("failed to remove {}: {}", dir.display(), e))
        })
    }
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして一時ディレクトリに作成
    ///
    /// `dockerfile_path` はビルドルートの外にあってもよい。アーカイブ内では
    /// ルート直下の `Dockerfile` になる。
    pub fn create_context(context_path: &Path, dockerfile_path: &Path) -> Result<ContextArchive> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        if !context_path.is_dir() {
            return Err(BuildError::Archive(format!(
                "build root is not a directory: {}",
                context_path.display()
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix("orchard-build-")
            .tempdir()
            .map_err(archive_error("failed to create temporary directory"))?;
        let path = dir.path().join(CONTEXT_ARCHIVE_NAME);

        Self::write_archive(&path, context_path, dockerfile_path)?;

        let size = std::fs::metadata(&path)
            .map_err(archive_error("failed to stat archive"))?
            .len();
        tracing::debug!("Build context created: {} ({} bytes)", path.display(), size);

        // コンテキストサイズの警告
        Self::check_context_size(size);

        Ok(ContextArchive { dir, path, size })
    }

    fn write_archive(path: &Path, context_path: &Path, dockerfile_path: &Path) -> Result<()> {
        // Dockerfileを先に読んでおき、存在しなければアーカイブを書く前に失敗させる
        let mut dockerfile_content = Vec::new();
        File::open(dockerfile_path)
            .and_then(|mut f| f.read_to_end(&mut dockerfile_content))
            .map_err(|e| {
                BuildError::Archive(format!(
                    "failed to read dockerfile {}: {}",
                    dockerfile_path.display(),
                    e
                ))
            })?;

        let file = File::create(path).map_err(archive_error("failed to create archive"))?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = Builder::new(encoder);
        tar.follow_symlinks(false);

        // コンテキストディレクトリを再帰的に追加
        tar.append_dir_all(".", context_path)
            .map_err(archive_error("failed to add build root"))?;

        // ビルドルート直下のDockerfileそのものなら二重に追加しない
        if !Self::is_root_dockerfile(context_path, dockerfile_path) {
            let mut header = tar::Header::new_gnu();
            header
                .set_path("Dockerfile")
                .map_err(archive_error("failed to set Dockerfile path"))?;
            header.set_size(dockerfile_content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            tar.append(&header, &dockerfile_content[..])
                .map_err(archive_error("failed to add Dockerfile"))?;
        }

        let encoder = tar
            .into_inner()
            .map_err(archive_error("failed to finish tar stream"))?;
        let file = encoder
            .finish()
            .map_err(archive_error("failed to finish gzip stream"))?;
        file.sync_all()
            .map_err(archive_error("failed to flush archive"))?;

        Ok(())
    }

    fn is_root_dockerfile(context_path: &Path, dockerfile_path: &Path) -> bool {
        let root_dockerfile = context_path.join("Dockerfile");
        match (
            root_dockerfile.canonicalize(),
            dockerfile_path.canonicalize(),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// コンテキストサイズのチェックと警告
    fn check_context_size(size: u64) {
        const MAX_CONTEXT_SIZE: u64 = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
                 ビルドルートから不要なファイルを除外することを推奨します。",
                size / 1024 / 1024
            );
        }
    }
}

fn archive_error(what: &'static str) -> impl Fn(std::io::Error) -> BuildError {
    move |e| BuildError::Archive(format!("{}: {}", what, e))
}
