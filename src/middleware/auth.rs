use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DbErr, EntityTrait, Set};

use crate::entities::user;
use crate::error::AppResult;
use crate::utils::jwt::{verify_token, Claims};
use crate::AppState;

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;
    ensure_user(&state, &claims).await?;

    // Add claims to request extensions for handlers to use
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Create the local account row the first time a user is seen.
async fn ensure_user(state: &AppState, claims: &Claims) -> AppResult<()> {
    let row = user::ActiveModel {
        id: Set(claims.sub),
        email: Set(claims.email.clone()),
        created_at: Set(Utc::now()),
    };

    let inserted = user::Entity::insert(row)
        .on_conflict(OnConflict::column(user::Column::Id).do_nothing().to_owned())
        .exec(&state.db)
        .await;

    match inserted {
        Ok(_) => {
            tracing::info!(user_id = %claims.sub, "First request from user");
            Ok(())
        }
        Err(DbErr::RecordNotInserted) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
