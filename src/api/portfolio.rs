// Portfolio content routes - generic CRUD over every collection

use axum::{
    extract::Path,
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::extract::{ApiJson, DbConn};
use crate::app_state::AppState;
use crate::database;
use crate::error::{AppError, AppResult};
use crate::models::{
    Certification, ContactMessage, ContactMessagePatch, Education, Experience, PersonalInfo,
    PersonalInfoPatch, Procedure, Project, Record, Resource, SkillCategory, Testimonial,
    VeilleContent,
};

pub fn portfolio_routes() -> Router<AppState> {
    let router = Router::new().route(
        "/personal-info",
        get(get_personal_info).put(update_personal_info),
    );

    let router = collection::<Education>(router, "/education");
    let router = collection::<SkillCategory>(router, "/skills");
    let router = collection::<Project>(router, "/projects");
    let router = collection::<Experience>(router, "/experience");
    let router = collection::<Certification>(router, "/certifications");
    let router = collection::<Testimonial>(router, "/testimonials");
    let router = collection::<Procedure>(router, "/procedures");
    let router = collection::<VeilleContent>(router, "/veille");

    router
        .route("/veille/type/{veille_type}", get(list_veille_by_type))
        // contact messages are never edited, only marked read
        .route(
            "/contact-messages",
            get(list_records::<ContactMessage>).post(create_record::<ContactMessage>),
        )
        .route(
            "/contact-messages/{id}",
            get(get_record::<ContactMessage>).delete(delete_record::<ContactMessage>),
        )
        .route("/contact-messages/{id}/read", put(mark_message_read))
}

/// List/create on `path`, get/update/delete on `path/{id}`
fn collection<R: Resource>(router: Router<AppState>, path: &str) -> Router<AppState> {
    router
        .route(path, get(list_records::<R>).post(create_record::<R>))
        .route(
            &format!("{}/{{id}}", path),
            get(get_record::<R>)
                .put(update_record::<R>)
                .delete(delete_record::<R>),
        )
}

fn not_found<R: Resource>() -> AppError {
    AppError::NotFound(format!("{} not found", R::LABEL))
}

async fn list_records<R: Resource>(mut db: DbConn) -> AppResult<Json<Vec<Record<R>>>> {
    Ok(Json(database::list::<R>(&mut db).await?))
}

async fn create_record<R: Resource>(
    mut db: DbConn,
    ApiJson(payload): ApiJson<R::Create>,
) -> AppResult<Json<Record<R>>> {
    let record = database::insert::<R>(&mut db, payload.into()).await?;
    Ok(Json(record))
}

async fn get_record<R: Resource>(
    mut db: DbConn,
    Path(id): Path<String>,
) -> AppResult<Json<Record<R>>> {
    database::get::<R>(&mut db, &id)
        .await?
        .map(Json)
        .ok_or_else(not_found::<R>)
}

async fn update_record<R: Resource>(
    mut db: DbConn,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<R::Patch>,
) -> AppResult<Json<Record<R>>> {
    database::update::<R>(&mut db, &id, &patch)
        .await?
        .map(Json)
        .ok_or_else(not_found::<R>)
}

async fn delete_record<R: Resource>(
    mut db: DbConn,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    if !database::delete::<R>(&mut db, &id).await? {
        return Err(not_found::<R>());
    }
    Ok(Json(json!({
        "message": format!("{} deleted successfully", R::LABEL)
    })))
}

async fn get_personal_info(mut db: DbConn) -> AppResult<Json<Record<PersonalInfo>>> {
    database::first::<PersonalInfo>(&mut db)
        .await?
        .map(Json)
        .ok_or_else(not_found::<PersonalInfo>)
}

async fn update_personal_info(
    mut db: DbConn,
    ApiJson(patch): ApiJson<PersonalInfoPatch>,
) -> AppResult<Json<Record<PersonalInfo>>> {
    let current = database::first::<PersonalInfo>(&mut db)
        .await?
        .ok_or_else(not_found::<PersonalInfo>)?;

    database::update::<PersonalInfo>(&mut db, &current.id, &patch)
        .await?
        .map(Json)
        .ok_or_else(not_found::<PersonalInfo>)
}

async fn mark_message_read(mut db: DbConn, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let patch = ContactMessagePatch { read: Some(true) };
    database::update::<ContactMessage>(&mut db, &id, &patch)
        .await?
        .ok_or_else(not_found::<ContactMessage>)?;

    Ok(Json(json!({ "message": "Message marked as read" })))
}

async fn list_veille_by_type(
    mut db: DbConn,
    Path(veille_type): Path<String>,
) -> AppResult<Json<Vec<Record<VeilleContent>>>> {
    Ok(Json(
        database::list_where::<VeilleContent>(&mut db, "type", &veille_type).await?,
    ))
}
