use anyhow::Result;
use url::Url;

/// 只接受带主机名的 http/https 地址
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn validate_speed_limit(limit_kb: u64) -> Result<()> {
    // 超过 u64 字节范围时视为配置错误
    if limit_kb.checked_mul(1024).is_none() {
        anyhow::bail!("速度限制过大: {} KB/s", limit_kb);
    }
    Ok(())
}

pub fn validate_output_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        anyhow::bail!("输出路径不能为空");
    }
    let path = std::path::Path::new(path);
    if path.exists() && !path.is_dir() {
        anyhow::bail!("输出路径不是目录: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(is_valid_url("https://example.com/a.mp4"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("ftp://example.com/a.mp4"));
        assert!(!is_valid_url("invalid-url"));
        assert!(!is_valid_url("https://"));
    }

    #[test]
    fn test_speed_limit_validation() {
        assert!(validate_speed_limit(0).is_ok());
        assert!(validate_speed_limit(1000).is_ok());
        assert!(validate_speed_limit(u64::MAX).is_err());
    }

    #[test]
    fn test_output_path_validation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(dir.path().to_str().unwrap()).is_ok());
        assert!(validate_output_path("./nonexistent").is_ok());
        assert!(validate_output_path("  ").is_err());

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(validate_output_path(file.to_str().unwrap()).is_err());
    }
}
