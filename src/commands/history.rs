use super::AppContext;
use crate::database::queries;
use crate::models::CommandRecord;

pub async fn get_command_history(
    ctx: &AppContext,
    limit: Option<i32>,
) -> Result<Vec<CommandRecord>, String> {
    let conn = ctx.open_db()?;
    let row_limit = limit.unwrap_or(20).clamp(1, 500) as usize;
    queries::get_command_history(&conn, row_limit).map_err(|e| e.to_string())
}

pub async fn clear_command_history(ctx: &AppContext) -> Result<(), String> {
    let conn = ctx.open_db()?;
    queries::clear_command_history(&conn).map_err(|e| e.to_string())
}
