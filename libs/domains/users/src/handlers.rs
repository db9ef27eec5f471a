use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    routing::get,
};
use axum_helpers::{
    AuditEvent, AuditOutcome, IdPath, JwtAuth, ValidatedJson,
    errors::responses::{
        BadRequestIdResponse, BadRequestValidationResponse, ForbiddenResponse,
        InternalServerErrorResponse, NotFoundResponse, UnauthorizedResponse,
        UnprocessableEntityResponse,
    },
    jwt_auth_middleware,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::UserResult;
use crate::models::{CreateUser, Role, UpdateUser, UserDetail, UserSummary};
use crate::policy::Actor;
use crate::repository::UserRepository;
use crate::service::UserService;

pub const TAG: &str = "users";

/// OpenAPI documentation for the Users API
#[derive(OpenApi)]
#[openapi(
    paths(list_users, create_user, show_user, update_user, patch_user, delete_user),
    components(
        schemas(UserSummary, UserDetail, Role, CreateUser, UpdateUser),
        responses(
            BadRequestValidationResponse,
            BadRequestIdResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            NotFoundResponse,
            UnprocessableEntityResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = TAG, description = "User account management")
    )
)]
pub struct ApiDoc;

/// Create the users router. Every route requires a valid access token.
pub fn router<R: UserRepository + 'static>(service: UserService<R>, auth: JwtAuth) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/", get(list_users).post(create_user))
        .route(
            "/{id}",
            get(show_user)
                .put(update_user)
                .patch(patch_user)
                .delete(delete_user),
        )
        .route_layer(middleware::from_fn_with_state(auth, jwt_auth_middleware))
        .with_state(shared_service)
}

/// Writes one audit event for a finished operation.
fn audit<T>(
    result: &UserResult<T>,
    actor: &Actor,
    action: &str,
    resource: Option<String>,
    headers: &HeaderMap,
) {
    let outcome = match result {
        Ok(_) => AuditOutcome::Success,
        Err(e) if e.is_forbidden() => AuditOutcome::Denied,
        Err(_) => AuditOutcome::Failure,
    };

    AuditEvent::new(Some(actor.id.to_string()), action, resource, outcome)
        .with_request(headers)
        .log();
}

/// List all users
#[utoipa::path(
    get,
    path = "",
    tag = TAG,
    responses(
        (status = 200, description = "All users, without passwords or roles", body = Vec<UserSummary>),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_users<R: UserRepository>(
    State(service): State<Arc<UserService<R>>>,
    actor: Actor,
    headers: HeaderMap,
) -> UserResult<Json<Vec<UserSummary>>> {
    let result = service.list_users(&actor).await;
    if matches!(&result, Err(e) if e.is_forbidden()) {
        audit(&result, &actor, "user.index", None, &headers);
    }
    Ok(Json(result?))
}

/// Create a user and assign its roles
#[utoipa::path(
    post,
    path = "",
    tag = TAG,
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created"),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn create_user<R: UserRepository>(
    State(service): State<Arc<UserService<R>>>,
    actor: Actor,
    headers: HeaderMap,
    ValidatedJson(input): ValidatedJson<CreateUser>,
) -> UserResult<StatusCode> {
    let result = service.create_user(&actor, input).await;

    let resource = result.as_ref().ok().map(|user| format!("user:{}", user.id));
    audit(&result, &actor, "user.create", resource, &headers);

    result?;
    Ok(StatusCode::CREATED)
}

/// Get a user with its roles
#[utoipa::path(
    get,
    path = "/{id}",
    tag = TAG,
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = UserDetail),
        (status = 400, response = BadRequestIdResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn show_user<R: UserRepository>(
    State(service): State<Arc<UserService<R>>>,
    actor: Actor,
    headers: HeaderMap,
    IdPath(id): IdPath,
) -> UserResult<Json<UserDetail>> {
    let result = service.get_user(&actor, id).await;
    if matches!(&result, Err(e) if e.is_forbidden()) {
        audit(&result, &actor, "user.show", Some(format!("user:{id}")), &headers);
    }
    Ok(Json(result?))
}

/// Update a user; a supplied `roles` array replaces the role set
#[utoipa::path(
    put,
    path = "/{id}",
    tag = TAG,
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 204, description = "User updated"),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn update_user<R: UserRepository>(
    State(service): State<Arc<UserService<R>>>,
    actor: Actor,
    headers: HeaderMap,
    IdPath(id): IdPath,
    ValidatedJson(input): ValidatedJson<UpdateUser>,
) -> UserResult<StatusCode> {
    let result = service.update_user(&actor, id, input).await;
    audit(&result, &actor, "user.update", Some(format!("user:{id}")), &headers);

    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// Same as `PUT /{id}`
#[utoipa::path(
    patch,
    path = "/{id}",
    tag = TAG,
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 204, description = "User updated"),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn patch_user<R: UserRepository>(
    state: State<Arc<UserService<R>>>,
    actor: Actor,
    headers: HeaderMap,
    id: IdPath,
    input: ValidatedJson<UpdateUser>,
) -> UserResult<StatusCode> {
    update_user(state, actor, headers, id, input).await
}

/// Delete a user and its role assignments
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = TAG,
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, response = BadRequestIdResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn delete_user<R: UserRepository>(
    State(service): State<Arc<UserService<R>>>,
    actor: Actor,
    headers: HeaderMap,
    IdPath(id): IdPath,
) -> UserResult<StatusCode> {
    let result = service.delete_user(&actor, id).await;
    audit(&result, &actor, "user.delete", Some(format!("user:{id}")), &headers);

    result?;
    Ok(StatusCode::NO_CONTENT)
}
