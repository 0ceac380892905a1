//! 通用工具函数

use rand::Rng;

/// displayId 字符表: 大写字母和数字
const DISPLAY_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// displayId 固定长度
pub const DISPLAY_ID_LEN: usize = 8;

/// 生成面向用户的检查编号
///
/// 8位大写字母数字组合。36^8 的空间足够大，碰撞由调用方
/// 结合唯一索引做有限次重试兜底。
pub fn generate_display_id() -> String {
    let mut rng = rand::thread_rng();
    (0..DISPLAY_ID_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..DISPLAY_ID_CHARSET.len());
            DISPLAY_ID_CHARSET[idx] as char
        })
        .collect()
}

/// 验证检查编号格式
pub fn is_valid_display_id(id: &str) -> bool {
    id.len() == DISPLAY_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_display_id() {
        let id = generate_display_id();
        assert!(is_valid_display_id(&id));
    }

    #[test]
    fn test_generated_ids_vary() {
        let a = generate_display_id();
        let b = generate_display_id();
        let c = generate_display_id();
        // 三连碰撞的概率可以忽略
        assert!(!(a == b && b == c));
    }

    #[test]
    fn test_is_valid_display_id() {
        assert!(is_valid_display_id("A1B2C3D4"));
        assert!(is_valid_display_id("ZZZZZZZZ"));
        assert!(!is_valid_display_id(""));
        assert!(!is_valid_display_id("abc12345"));
        assert!(!is_valid_display_id("A1B2C3D"));
        assert!(!is_valid_display_id("A1B2C3D45"));
        assert!(!is_valid_display_id("A1B2-3D4"));
    }
}
