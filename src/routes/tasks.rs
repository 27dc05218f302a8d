use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{Task, TaskInput, TaskQuery},
    state::AppState,
};
use actix_web::{delete, get, http::header, post, put, web, HttpResponse, Responder};
use uuid::Uuid;
use validator::Validate;

/// Lists the caller's tasks, newest first.
///
/// ## Query Parameters:
/// - `status` (optional): `todo`, `in_progress`, `review` or `done`.
/// - `priority` (optional): `low`, `medium`, `high` or `urgent`.
/// - `assigned_to` (optional): user ID the task is assigned to.
/// - `search` (optional): case-insensitive match on title and description.
#[get("")]
pub async fn get_tasks(
    state: web::Data<AppState>,
    query: web::Query<TaskQuery>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    let tasks = state.storage.list_tasks(user.0.id, &query).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// Creates a task owned by the caller.
///
/// ## Responses:
/// - `201 Created`: the task, with its URL in `Location`.
/// - `422 Unprocessable Entity`: title or description out of bounds.
#[post("")]
pub async fn create_task(
    state: web::Data<AppState>,
    task_data: web::Json<TaskInput>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;

    let task = Task::new(task_data.into_inner(), user.0.id, state.clock.now());
    let created = state.storage.insert_task(&task).await?;

    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, format!("/api/v1/tasks/{}", created.id)))
        .json(created))
}

/// Fetches one task. Tasks owned by someone else are reported as missing.
#[get("/{id}")]
pub async fn get_task(
    state: web::Data<AppState>,
    task_id: web::Path<Uuid>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    let task = state
        .storage
        .task_by_id(task_id.into_inner(), user.0.id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(task))
}

/// Replaces a task's editable fields.
#[put("/{id}")]
pub async fn update_task(
    state: web::Data<AppState>,
    task_id: web::Path<Uuid>,
    task_data: web::Json<TaskInput>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;

    let task = state
        .storage
        .update_task(
            task_id.into_inner(),
            user.0.id,
            &task_data,
            state.clock.now(),
        )
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(task))
}

#[delete("/{id}")]
pub async fn delete_task(
    state: web::Data<AppState>,
    task_id: web::Path<Uuid>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    if !state
        .storage
        .delete_task(task_id.into_inner(), user.0.id)
        .await?
    {
        return Err(AppError::NotFound);
    }
    Ok(HttpResponse::NoContent().finish())
}
