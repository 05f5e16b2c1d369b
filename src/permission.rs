use std::path::PathBuf;

/// 权限来源
pub trait PermissionSource: Send + Sync {
    /// 是否为特权用户 (ROOT / 超级用户 / 管理用户)
    fn is_privileged(&self, user_id: &str) -> bool;

    /// 是否为 ROOT 用户
    fn is_root(&self, user_id: &str) -> bool;
}

/// 配置中的 ROOT 列表 + 工作目录下的两个用户列表文件
///
/// 每次调用都重新读取文件，任何读取失败都按无权限处理。
#[derive(Debug, Clone)]
pub struct FilePermissions {
    pub root_users: Vec<String>,
    pub super_user_file: PathBuf,
    pub manage_user_file: PathBuf,
}

impl FilePermissions {
    pub fn new(root_users: Vec<String>) -> Self {
        Self {
            root_users,
            super_user_file: PathBuf::from("Super_User.ini"),
            manage_user_file: PathBuf::from("Manage_User.ini"),
        }
    }

    fn listed_in(path: &PathBuf, user_id: &str) -> std::io::Result<bool> {
        let content = std::fs::read_to_string(path)?;
        Ok(content.lines().any(|line| line.trim() == user_id))
    }
}

impl PermissionSource for FilePermissions {
    fn is_privileged(&self, user_id: &str) -> bool {
        if self.is_root(user_id) {
            return true;
        }
        // 按顺序读取，任一文件读取失败即拒绝
        let check = || -> std::io::Result<bool> {
            Ok(Self::listed_in(&self.super_user_file, user_id)?
                || Self::listed_in(&self.manage_user_file, user_id)?)
        };
        check().unwrap_or(false)
    }

    fn is_root(&self, user_id: &str) -> bool {
        self.root_users.iter().any(|u| u == user_id)
    }
}
