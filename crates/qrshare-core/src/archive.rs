//! 传输载荷与 ZIP 打包
//!
//! 多个路径、目录或显式要求压缩时，先打包为临时 ZIP 再发送；
//! 单个普通文件直接发送原文件。

use anyhow::{Context, bail};
use log::{debug, info};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// 待发送的载荷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// 下载时展示给客户端的文件名
    pub filename: String,
    /// 实际文件路径（可能是临时 ZIP）
    pub path: PathBuf,
    /// 传输结束后删除 `path`
    pub delete_after_transfer: bool,
}

impl Payload {
    /// 直接发送一个已存在的文件
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let metadata =
            fs::metadata(path).with_context(|| format!("cannot access {}", path.display()))?;
        if metadata.is_dir() {
            bail!("{} is a directory", path.display());
        }
        Ok(Self {
            filename: display_name(path, "file"),
            path: path.to_path_buf(),
            delete_after_transfer: false,
        })
    }

    /// 根据输入路径构建载荷
    ///
    /// 任一路径不存在时返回错误，且不会创建任何临时文件。
    pub fn from_paths(paths: &[PathBuf], force_zip: bool) -> anyhow::Result<Self> {
        if paths.is_empty() {
            bail!("no input paths given");
        }

        let mut has_dir = false;
        for path in paths {
            let metadata =
                fs::metadata(path).with_context(|| format!("cannot access {}", path.display()))?;
            has_dir |= metadata.is_dir();
        }

        if paths.len() == 1 && !has_dir && !force_zip {
            return Self::from_file(&paths[0]);
        }

        let archive_path =
            std::env::temp_dir().join(format!("{}-{}.zip", crate::APP_NAME, Uuid::new_v4()));

        if let Err(e) = write_zip_archive(&archive_path, paths) {
            let _ = fs::remove_file(&archive_path);
            return Err(e);
        }

        let filename = match paths {
            [single] => format!("{}.zip", archive_stem(single)),
            _ => display_name(&archive_path, "archive.zip"),
        };

        info!(
            "Packed {} path(s) into {} as {}",
            paths.len(),
            archive_path.display(),
            filename
        );

        Ok(Self {
            filename,
            path: archive_path,
            delete_after_transfer: true,
        })
    }

    /// 从磁盘删除载荷
    pub fn delete(&self) -> io::Result<()> {
        if self.path.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        }
    }
}

fn display_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn archive_stem(path: &Path) -> String {
    if path.is_dir() {
        return display_name(path, "archive");
    }
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string())
}

fn write_zip_archive(archive_path: &Path, inputs: &[PathBuf]) -> anyhow::Result<()> {
    let file = File::create(archive_path)
        .with_context(|| format!("Failed to create zip archive {}", archive_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut names = HashSet::new();

    for input in inputs {
        if input.is_dir() {
            let root = display_name(input, "dir");
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry.with_context(|| format!("walking {}", input.display()))?;
                let rel = entry.path().strip_prefix(input).unwrap_or(entry.path());
                let wanted = Path::new(&root).join(rel);

                if entry.file_type().is_dir() {
                    zip.add_directory(entry_name(&wanted), options)?;
                } else if entry.path().is_file() {
                    let name = unique_entry_name(&wanted, &mut names);
                    add_file(&mut zip, entry.path(), &name, options)?;
                }
            }
        } else {
            let wanted = PathBuf::from(display_name(input, "file"));
            let name = unique_entry_name(&wanted, &mut names);
            add_file(&mut zip, input, &name, options)?;
        }
    }

    zip.finish().context("Failed to finalize zip archive")?;
    Ok(())
}

fn add_file(
    zip: &mut zip::ZipWriter<File>,
    source_path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> anyhow::Result<()> {
    let mut source = File::open(source_path)
        .with_context(|| format!("Failed to open {}", source_path.display()))?;
    zip.start_file(name, options)
        .with_context(|| format!("Failed to start zip entry {}", name))?;
    io::copy(&mut source, zip)
        .with_context(|| format!("Failed to add {} to zip", source_path.display()))?;
    debug!("Added {} as {}", source_path.display(), name);
    Ok(())
}

fn entry_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// 重名条目追加 `-N` 后缀
fn unique_entry_name(wanted: &Path, names: &mut HashSet<String>) -> String {
    let name = entry_name(wanted);
    if names.insert(name.clone()) {
        return name;
    }

    let stem = wanted
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let ext = wanted.extension().map(|e| e.to_string_lossy().to_string());
    let parent = wanted.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut idx = 2usize;
    loop {
        let candidate_name = match &ext {
            Some(ext) if !ext.is_empty() => format!("{}-{}.{}", stem, idx, ext),
            _ => format!("{}-{}", stem, idx),
        };
        let candidate = entry_name(&parent.join(candidate_name));
        if names.insert(candidate.clone()) {
            return candidate;
        }
        idx += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_single_file_is_sent_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, b"hello").unwrap();

        let payload = Payload::from_paths(&[file.clone()], false).unwrap();
        assert_eq!(payload.path, file);
        assert_eq!(payload.filename, "doc.txt");
        assert!(!payload.delete_after_transfer);
    }

    #[test]
    fn test_multiple_files_are_zipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"aaa").unwrap();
        fs::write(&b, b"bbb").unwrap();

        let payload = Payload::from_paths(&[a, b], false).unwrap();
        assert!(payload.delete_after_transfer);
        assert!(payload.filename.ends_with(".zip"));
        assert_eq!(entries(&payload.path), vec!["a.txt", "b.txt"]);

        let mut archive = zip::ZipArchive::new(File::open(&payload.path).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("b.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "bbb");

        payload.delete().unwrap();
        assert!(!payload.path.exists());
    }

    #[test]
    fn test_directory_is_zipped() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        fs::create_dir_all(photos.join("2024")).unwrap();
        fs::write(photos.join("cat.jpg"), b"meow").unwrap();
        fs::write(photos.join("2024").join("dog.jpg"), b"woof").unwrap();

        let payload = Payload::from_paths(&[photos], false).unwrap();
        assert!(payload.delete_after_transfer);
        assert_eq!(payload.filename, "photos.zip");

        let names = entries(&payload.path);
        assert!(names.contains(&"photos/cat.jpg".to_string()));
        assert!(names.contains(&"photos/2024/dog.jpg".to_string()));

        payload.delete().unwrap();
    }

    #[test]
    fn test_force_zip_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"%PDF").unwrap();

        let payload = Payload::from_paths(&[file.clone()], true).unwrap();
        assert!(payload.delete_after_transfer);
        assert_ne!(payload.path, file);
        assert_eq!(payload.filename, "report.zip");
        assert_eq!(entries(&payload.path), vec!["report.pdf"]);

        payload.delete().unwrap();
        assert!(file.exists(), "source file must survive payload cleanup");
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.txt");
        fs::write(&present, b"x").unwrap();
        let missing = dir.path().join("missing.txt");

        assert!(Payload::from_paths(&[present, missing], false).is_err());
        assert!(Payload::from_paths(&[], false).is_err());
    }

    #[test]
    fn test_duplicate_entry_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("x")).unwrap();
        fs::create_dir_all(dir.path().join("y")).unwrap();
        let first = dir.path().join("x").join("same.txt");
        let second = dir.path().join("y").join("same.txt");
        fs::write(&first, b"1").unwrap();
        fs::write(&second, b"2").unwrap();

        let payload = Payload::from_paths(&[first, second], false).unwrap();
        assert_eq!(entries(&payload.path), vec!["same-2.txt", "same.txt"]);
        payload.delete().unwrap();
    }
}
