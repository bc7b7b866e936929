//! limit/offset paging shared by the list endpoints

pub const DEFAULT_LIMIT: i32 = 20;
pub const MAX_LIMIT: i32 = 100;

/// Validate paging parameters and resolve them to (limit, offset)
pub fn resolve_page(limit: Option<i32>, offset: Option<i32>) -> Result<(u64, u64), String> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit < 1 {
        return Err("limit must be at least 1".to_string());
    }
    if limit > MAX_LIMIT {
        return Err(format!("limit cannot exceed {}", MAX_LIMIT));
    }

    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err("offset cannot be negative".to_string());
    }

    Ok((limit as u64, offset as u64))
}
