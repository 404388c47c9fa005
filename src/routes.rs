use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::auth::Actor;
use crate::error::ApiError;
use crate::ledger::{Ledger, NewGroup, NewPersonalExpense, NewSharedExpense};

type Handled = Result<HttpResponse, ApiError>;

#[derive(Deserialize)]
struct ExpensePath {
    id: String,
    expense: String,
}

#[derive(Deserialize)]
struct MemberPath {
    id: String,
    nick: String,
}

#[put("/groups/{id}")]
async fn add_group(
    ledger: web::Data<Ledger>,
    actor: Actor,
    id: web::Path<String>,
    json: web::Json<NewGroup>,
) -> Handled {
    let group = ledger
        .create_group(&actor.0, id.into_inner(), json.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups/{id}")]
async fn get_group(ledger: web::Data<Ledger>, actor: Actor, id: web::Path<String>) -> Handled {
    Ok(HttpResponse::Ok().json(ledger.group(&actor.0, &id).await?))
}

#[get("/groups/{id}/balance")]
async fn get_balance(ledger: web::Data<Ledger>, actor: Actor, id: web::Path<String>) -> Handled {
    Ok(HttpResponse::Ok().json(ledger.balances(&actor.0, &id).await?))
}

#[post("/groups/{id}/join")]
async fn join_group(ledger: web::Data<Ledger>, actor: Actor, id: web::Path<String>) -> Handled {
    Ok(HttpResponse::Ok().json(ledger.join_group(&actor.0, &id).await?))
}

#[post("/groups/{id}/leave")]
async fn leave_group(ledger: web::Data<Ledger>, actor: Actor, id: web::Path<String>) -> Handled {
    ledger.leave_group(&actor.0, &id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[put("/groups/{id}/members/{nick}")]
async fn add_member(ledger: web::Data<Ledger>, actor: Actor, path: web::Path<MemberPath>) -> Handled {
    Ok(HttpResponse::Ok().json(ledger.add_member(&actor.0, &path.id, &path.nick).await?))
}

#[delete("/groups/{id}/members/{nick}")]
async fn remove_member(
    ledger: web::Data<Ledger>,
    actor: Actor,
    path: web::Path<MemberPath>,
) -> Handled {
    ledger.remove_member(&actor.0, &path.id, &path.nick).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    ledger: web::Data<Ledger>,
    actor: Actor,
    id: web::Path<String>,
    expense: web::Json<NewSharedExpense>,
) -> Handled {
    let expense = ledger
        .add_shared_expense(&actor.0, &id, expense.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(expense))
}

#[put("/groups/{id}/expenses/{expense}")]
async fn update_expense(
    ledger: web::Data<Ledger>,
    actor: Actor,
    path: web::Path<ExpensePath>,
    changes: web::Json<NewSharedExpense>,
) -> Handled {
    let expense = ledger
        .update_shared_expense(&actor.0, &path.id, &path.expense, changes.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[delete("/groups/{id}/expenses/{expense}")]
async fn delete_expense(
    ledger: web::Data<Ledger>,
    actor: Actor,
    path: web::Path<ExpensePath>,
) -> Handled {
    ledger
        .delete_shared_expense(&actor.0, &path.id, &path.expense)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/expenses/{expense}/settle")]
async fn settle_split(
    ledger: web::Data<Ledger>,
    actor: Actor,
    path: web::Path<ExpensePath>,
) -> Handled {
    let split = ledger
        .settle_split(&actor.0, &path.id, &path.expense)
        .await?;
    Ok(HttpResponse::Ok().json(split))
}

#[post("/expenses")]
async fn add_personal_expense(
    ledger: web::Data<Ledger>,
    actor: Actor,
    expense: web::Json<NewPersonalExpense>,
) -> Handled {
    let expense = ledger
        .record_personal_expense(&actor.0, expense.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(expense))
}

#[get("/expenses")]
async fn list_personal_expenses(ledger: web::Data<Ledger>, actor: Actor) -> Handled {
    Ok(HttpResponse::Ok().json(ledger.personal_expenses(&actor.0).await?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(add_group)
        .service(get_group)
        .service(get_balance)
        .service(join_group)
        .service(leave_group)
        .service(add_member)
        .service(remove_member)
        .service(add_expense)
        .service(update_expense)
        .service(delete_expense)
        .service(settle_split)
        .service(add_personal_expense)
        .service(list_personal_expenses);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ACTING_USER_HEADER;
    use crate::balance::Balance;
    use crate::config::AuthConfig;
    use crate::schemas::{Expense, Group, Split};
    use crate::store::MemoryStore;
    use actix_web::{
        http::{header::AUTHORIZATION, StatusCode},
        test, App,
    };
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    const TOKEN: &str = "bot-token";

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(Ledger::new(Arc::new(MemoryStore::new()))))
                    .app_data(web::Data::new(AuthConfig {
                        bot_token: TOKEN.to_string(),
                        login_max_age: Duration::days(1),
                    }))
                    .configure(configure),
            )
            .await
        };
    }

    fn as_user(request: test::TestRequest, nick: &str) -> test::TestRequest {
        request
            .insert_header((AUTHORIZATION, TOKEN))
            .insert_header((ACTING_USER_HEADER, nick))
    }

    #[actix_web::test]
    async fn expense_flow_over_http() {
        let app = app!();

        let request = as_user(test::TestRequest::put().uri("/groups/trip"), "ana")
            .set_json(json!({ "name": "Lisbon" }))
            .to_request();
        let group: Group = test::call_and_read_body_json(&app, request).await;
        assert_eq!(group.created_by, "ana");

        let request = as_user(test::TestRequest::post().uri("/groups/trip/join"), "bob").to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);

        let request = as_user(test::TestRequest::post().uri("/groups/trip/expenses"), "ana")
            .set_json(json!({
                "title": "Dinner",
                "amount": "50.00",
                "policy": {
                    "type": "percentage",
                    "shares": [
                        { "member": "ana", "value": "60" },
                        { "member": "bob", "value": "40" }
                    ]
                }
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let expense: Expense = test::read_body_json(response).await;
        assert_eq!(expense.splits[1].amount, dec!(20.00));

        let request = as_user(test::TestRequest::post().uri("/groups/trip/leave"), "bob").to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::CONFLICT);

        let request = as_user(test::TestRequest::get().uri("/groups/trip/balance"), "bob").to_request();
        let balance: Balance = test::call_and_read_body_json(&app, request).await;
        assert_eq!(balance["ana"], dec!(20.00));
        assert_eq!(balance["bob"], dec!(-20.00));

        let request = as_user(
            test::TestRequest::post().uri(&format!("/groups/trip/expenses/{}/settle", expense.id)),
            "bob",
        )
        .to_request();
        let split: Split = test::call_and_read_body_json(&app, request).await;
        assert!(split.settled);

        let request = as_user(test::TestRequest::post().uri("/groups/trip/leave"), "bob").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NO_CONTENT
        );
    }

    #[actix_web::test]
    async fn split_errors_are_bad_requests() {
        let app = app!();
        let request = as_user(test::TestRequest::put().uri("/groups/trip"), "ana")
            .set_json(json!({ "name": "Lisbon" }))
            .to_request();
        test::call_service(&app, request).await;

        let request = as_user(test::TestRequest::post().uri("/groups/trip/expenses"), "ana")
            .set_json(json!({
                "title": "Museum",
                "amount": "30.00",
                "policy": { "type": "exact", "shares": [{ "member": "ana", "value": "29.99" }] }
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(
            body["error"],
            "exact shares add up to 29.99, but the expense is 30.00"
        );
    }

    #[actix_web::test]
    async fn requests_need_credentials() {
        let app = app!();
        let request = test::TestRequest::get().uri("/expenses").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn non_members_cannot_read_groups() {
        let app = app!();
        let request = as_user(test::TestRequest::put().uri("/groups/trip"), "ana")
            .set_json(json!({ "name": "Lisbon" }))
            .to_request();
        test::call_service(&app, request).await;

        let request = as_user(test::TestRequest::get().uri("/groups/trip"), "eve").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::FORBIDDEN
        );
        let request = as_user(test::TestRequest::get().uri("/groups/none"), "eve").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn personal_expenses_round_trip() {
        let app = app!();
        let request = as_user(test::TestRequest::post().uri("/expenses"), "ana")
            .set_json(json!({
                "title": "Uber ride",
                "amount": "25.50",
                "date": "2024-03-01",
                "category": "Transportation"
            }))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::CREATED
        );

        let request = as_user(test::TestRequest::get().uri("/expenses"), "ana").to_request();
        let expenses: Vec<Expense> = test::call_and_read_body_json(&app, request).await;
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, dec!(25.50));
        assert_eq!(expenses[0].category.as_deref(), Some("Transportation"));
    }
}
