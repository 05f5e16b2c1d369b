use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// 以纯文本文件持久化的群号集合，每行一个
///
/// 每次变更都整体重写：先写同目录临时文件，再原子替换。写盘放在阻塞线程池中执行。
#[derive(Debug)]
pub struct Whitelist {
    path: PathBuf,
    groups: HashSet<String>,
}

impl Whitelist {
    /// 加载白名单，文件不存在视为空
    pub async fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let groups = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, groups })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.groups.contains(group_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 加入群号，返回是否发生变化；已存在时不写文件
    pub async fn add(&mut self, group_id: &str) -> io::Result<bool> {
        if !self.groups.insert(group_id.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.save().await {
            self.groups.remove(group_id);
            return Err(e);
        }
        Ok(true)
    }

    /// 移除群号，返回是否发生变化；不存在时不写文件
    pub async fn remove(&mut self, group_id: &str) -> io::Result<bool> {
        if !self.groups.remove(group_id) {
            return Ok(false);
        }
        if let Err(e) = self.save().await {
            self.groups.insert(group_id.to_string());
            return Err(e);
        }
        Ok(true)
    }

    pub async fn save(&self) -> io::Result<()> {
        let mut sorted: Vec<&String> = self.groups.iter().collect();
        sorted.sort();
        let content: String = sorted.iter().map(|gid| format!("{}\n", gid)).collect();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .map_err(io::Error::other)?
    }
}

fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = Whitelist::load(dir.path().join("none.txt")).await.unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn add_and_remove_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kuaishou_whitelist.txt");
        let mut list = Whitelist::load(&path).await.unwrap();

        assert!(list.add("100").await.unwrap());
        assert!(!list.add("100").await.unwrap());
        assert!(list.add("200").await.unwrap());
        assert!(list.remove("100").await.unwrap());
        assert!(!list.remove("100").await.unwrap());
        assert!(!list.remove("300").await.unwrap());

        assert!(!list.contains("100"));
        assert!(list.contains("200"));
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn mutations_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kuaishou_whitelist.txt");
        {
            let mut list = Whitelist::load(&path).await.unwrap();
            for gid in ["3", "1", "2"] {
                list.add(gid).await.unwrap();
            }
            list.remove("2").await.unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n3\n");
        let reloaded = Whitelist::load(&path).await.unwrap();
        assert!(reloaded.contains("1"));
        assert!(reloaded.contains("3"));
        assert!(!reloaded.contains("2"));

        let mut ids: Vec<&str> = reloaded.iter().collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "\n 123 \n\n456\n").unwrap();

        let list = Whitelist::load(&path).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("123"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn shared_list_persists_writes_from_concurrent_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kuaishou_whitelist.txt");
        let list = std::sync::Arc::new(tokio::sync::Mutex::new(Whitelist::load(&path).await.unwrap()));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let list = list.clone();
                tokio::spawn(async move { list.lock().await.add(&(1000 + i).to_string()).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }

        let reloaded = Whitelist::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 16);
        assert!(reloaded.contains("1015"));
    }

    #[tokio::test]
    async fn failed_write_rolls_back_membership() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        let mut list = Whitelist::load(&path).await.unwrap();
        // 目标位置被目录占据，替换必然失败
        std::fs::create_dir(&path).unwrap();

        assert!(list.add("1").await.is_err());
        assert!(!list.contains("1"));
    }
}
