/// Exchange rate endpoints
///
/// - `GET /v1/exchange-rates/:base` - Latest rates from a base currency
/// - `GET /v1/exchange-rates/convert?amount_minor=&from=&to=` - Convert an amount

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use kindred_shared::exchange::{Conversion, RateTable};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub amount_minor: i64,
    pub from: String,
    pub to: String,
}

pub async fn latest_rates(
    State(state): State<AppState>,
    Path(base): Path<String>,
) -> ApiResult<Json<RateTable>> {
    let table = state.exchange.rates(&base).await?;
    Ok(Json(RateTable::clone(&table)))
}

pub async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> ApiResult<Json<Conversion>> {
    let conversion = state
        .exchange
        .convert(query.amount_minor, &query.from, &query.to)
        .await?;

    Ok(Json(conversion))
}
