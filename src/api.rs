// src/api.rs
use crate::auth::user_id_from_header;
use crate::config::split_symbols;
use crate::error::{reject, ApiRejection, AppError};
use crate::market::lookup::LookupService;
use crate::market::MarketRecord;
use crate::models::{ApiResponse, Index, MarketKind, ResultStatus, Stock, SymbolResult, TransactionRequest};
use crate::paging::PageParams;
use crate::portfolio::PortfolioService;
use crate::watchlist::WatchlistService;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::filters::body::BodyDeserializeError;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

type JsonReply = WithStatus<Json>;
type Route = BoxedFilter<(JsonReply,)>;

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Read side of the scraped market data, one lookup per kind.
#[derive(Clone)]
pub struct MarketDataApi {
    pub stocks: LookupService<Stock>,
    pub indexes: LookupService<Index>,
}

/// Route groups served by this process. Absent groups are not mounted.
#[derive(Clone, Default)]
pub struct ApiContext {
    pub market_data: Option<MarketDataApi>,
    pub portfolio: Option<PortfolioService>,
    pub watchlist: Option<WatchlistService>,
}

#[derive(Debug, Deserialize)]
struct SymbolsQuery {
    symbols: Option<String>,
}

/// Every mounted route group with a JSON rejection handler on top.
pub fn app(ctx: ApiContext) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let mut groups: Vec<Route> = Vec::new();
    if let Some(market_data) = ctx.market_data {
        groups.push(market_data_routes(market_data));
    }
    if let Some(portfolio) = ctx.portfolio {
        groups.push(portfolio_routes(portfolio));
    }
    if let Some(watchlist) = ctx.watchlist {
        groups.push(watchlist_routes(watchlist.clone(), MarketKind::Stocks));
        groups.push(watchlist_routes(watchlist, MarketKind::Indexes));
    }

    let routes = groups
        .into_iter()
        .reduce(|acc, next| acc.or(next).unify().boxed())
        .unwrap_or_else(no_routes);

    routes
        .recover(handle_rejection)
        .unify()
        .with(warp::log("portfolio_tracker::api"))
}

fn no_routes() -> Route {
    warp::any()
        .and_then(|| async { Err::<JsonReply, Rejection>(warp::reject::not_found()) })
        .boxed()
}

fn with_state<T>(state: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone
where
    T: Clone + Send + Sync + 'static,
{
    warp::any().map(move || state.clone())
}

fn with_user() -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::path::full())
        .and_then(|header: Option<String>, path: FullPath| async move {
            user_id_from_header(header).map_err(|e| reject(e, path.as_str()))
        })
}

fn reply<T: Serialize>(response: &ApiResponse<T>) -> JsonReply {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(response), status)
}

fn symbols_param(query: SymbolsQuery, path: &str) -> Result<Vec<String>, Rejection> {
    let symbols = split_symbols(query.symbols.as_deref().unwrap_or_default());
    if symbols.is_empty() {
        return Err(reject(
            AppError::BadRequest("Symbols list cannot be empty".to_string()),
            path,
        ));
    }
    Ok(symbols)
}

// market data

fn market_data_routes(api: MarketDataApi) -> Route {
    let stock_symbols = warp::path!("market-data" / "api" / "v1" / "stocks" / "symbols")
        .and(warp::get())
        .and(with_state(api.stocks.clone()))
        .and(warp::path::full())
        .and_then(stock_symbols_handler);

    let index_symbols = warp::path!("market-data" / "api" / "v1" / "indexes" / "symbols")
        .and(warp::get())
        .and(with_state(api.indexes.clone()))
        .and(warp::path::full())
        .and_then(index_symbols_handler);

    let stocks = warp::path!("market-data" / "api" / "v1" / "stocks")
        .and(warp::get())
        .and(warp::query::<SymbolsQuery>())
        .and(with_state(api.stocks))
        .and(warp::path::full())
        .and_then(market_data_handler::<Stock>);

    let indexes = warp::path!("market-data" / "api" / "v1" / "indexes")
        .and(warp::get())
        .and(warp::query::<SymbolsQuery>())
        .and(with_state(api.indexes))
        .and(warp::path::full())
        .and_then(market_data_handler::<Index>);

    stock_symbols
        .or(index_symbols)
        .unify()
        .or(stocks)
        .unify()
        .or(indexes)
        .unify()
        .boxed()
}

async fn stock_symbols_handler(
    lookup: LookupService<Stock>,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let symbols = lookup.all_symbols().map_err(|e| reject(e.into(), path))?;
    let message = format!("{} stock symbols successfully received.", symbols.len());
    Ok(reply(&ApiResponse::ok(200, message, symbols, path)))
}

async fn index_symbols_handler(
    lookup: LookupService<Index>,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let names = lookup.symbol_names().map_err(|e| reject(e.into(), path))?;
    let message = format!("{} index symbols successfully received.", names.len());
    Ok(reply(&ApiResponse::ok(200, message, names, path)))
}

/// 200 when every symbol matched, 206 naming the missing ones otherwise.
async fn market_data_handler<R: MarketRecord>(
    query: SymbolsQuery,
    lookup: LookupService<R>,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let symbols = symbols_param(query, path)?;
    let lookup = lookup.data_for(&symbols).map_err(|e| reject(e.into(), path))?;

    if lookup.is_complete() {
        let message = format!(
            "{} {} symbols successfully received.",
            lookup.found.len(),
            R::KIND.noun()
        );
        return Ok(reply(&ApiResponse::ok(200, message, lookup.found, path)));
    }

    let message = format!(
        "Partial data received. Missing symbols are '{}'",
        lookup.missing.join(",")
    );
    warn!("{} lookup: {}", R::KIND, message);
    let response = ApiResponse::ok(206, message.clone(), lookup.found, path).with_error(206, message);
    Ok(reply(&response))
}

// portfolio

fn portfolio_routes(service: PortfolioService) -> Route {
    let add = warp::path!("portfolio" / "api" / "v1" / "transaction")
        .and(warp::post())
        .and(with_user())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(service.clone()))
        .and(warp::path::full())
        .and_then(add_transaction_handler);

    let list = warp::path!("portfolio" / "api" / "v1" / "transactions")
        .and(warp::get())
        .and(with_user())
        .and(warp::query::<PageParams>())
        .and(with_state(service.clone()))
        .and(warp::path::full())
        .and_then(list_transactions_handler);

    let delete = warp::path!("portfolio" / "api" / "v1" / "transactions" / String)
        .and(warp::delete())
        .and(with_user())
        .and(with_state(service.clone()))
        .and(warp::path::full())
        .and_then(delete_transaction_handler);

    let delete_symbol = warp::path!("portfolio" / "api" / "v1" / "stocks" / String / "transactions")
        .and(warp::delete())
        .and(with_user())
        .and(with_state(service.clone()))
        .and(warp::path::full())
        .and_then(delete_symbol_transactions_handler);

    let stocks = warp::path!("portfolio" / "api" / "v1" / "stocks")
        .and(warp::get())
        .and(with_user())
        .and(warp::query::<PageParams>())
        .and(with_state(service))
        .and(warp::path::full())
        .and_then(portfolio_stocks_handler);

    add.or(list)
        .unify()
        .or(delete)
        .unify()
        .or(delete_symbol)
        .unify()
        .or(stocks)
        .unify()
        .boxed()
}

async fn add_transaction_handler(
    user_id: String,
    request: TransactionRequest,
    service: PortfolioService,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let transaction = service
        .save_transaction(&user_id, request)
        .await
        .map_err(|e| reject(e, path))?;
    info!("Portfolio transaction added successfully for user '{}'", user_id);
    Ok(reply(&ApiResponse::ok(
        201,
        "Portfolio transaction added successfully.",
        transaction,
        path,
    )))
}

async fn list_transactions_handler(
    user_id: String,
    params: PageParams,
    service: PortfolioService,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let request = params.into_request("id", true).map_err(|e| reject(e, path))?;
    let page = service
        .list_transactions(&user_id, &request)
        .await
        .map_err(|e| reject(e, path))?;
    info!("User transactions received successfully for user '{}'", user_id);
    Ok(reply(&ApiResponse::ok(
        200,
        "User transactions received successfully.",
        page,
        path,
    )))
}

async fn delete_transaction_handler(
    transaction_id: String,
    user_id: String,
    service: PortfolioService,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    service
        .delete_transaction(&user_id, &transaction_id)
        .await
        .map_err(|e| reject(e, path))?;
    let message = format!(
        "Transaction with '{}' transaction id for userId '{}' is deleted successfully.",
        transaction_id, user_id
    );
    info!("{}", message);
    Ok(reply(&ApiResponse::ok(204, message, (), path)))
}

async fn delete_symbol_transactions_handler(
    symbol: String,
    user_id: String,
    service: PortfolioService,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    service
        .delete_symbol_transactions(&user_id, &symbol)
        .await
        .map_err(|e| reject(e, path))?;
    let message = format!(
        "Transaction with '{}' stock symbol for userId '{}' is deleted successfully.",
        symbol, user_id
    );
    info!("{}", message);
    Ok(reply(&ApiResponse::ok(204, message, (), path)))
}

async fn portfolio_stocks_handler(
    user_id: String,
    params: PageParams,
    service: PortfolioService,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let request = params
        .into_request("stockSymbol", false)
        .map_err(|e| reject(e, path))?;
    let page = service
        .portfolio_positions(&user_id, &request)
        .await
        .map_err(|e| reject(e, path))?;
    info!("Portfolio stocks received successfully for user '{}'", user_id);
    Ok(reply(&ApiResponse::ok(
        200,
        "Portfolio stocks received successfully.",
        page,
        path,
    )))
}

// watchlist

fn watchlist_routes(service: WatchlistService, kind: MarketKind) -> Route {
    let base = warp::path("watchlist")
        .and(warp::path("api"))
        .and(warp::path("v1"))
        .and(warp::path(kind.as_str()));

    let add = base
        .clone()
        .and(warp::path::end())
        .and(warp::post())
        .and(with_user())
        .and(warp::query::<SymbolsQuery>())
        .and(with_state(service.clone()))
        .and(with_state(kind))
        .and(warp::path::full())
        .and_then(add_watchlist_handler);

    let list = base
        .clone()
        .and(warp::path::end())
        .and(warp::get())
        .and(with_user())
        .and(warp::query::<PageParams>())
        .and(with_state(service.clone()))
        .and(with_state(kind))
        .and(warp::path::full())
        .and_then(list_watchlist_handler);

    let remove = base
        .clone()
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_user())
        .and(warp::query::<SymbolsQuery>())
        .and(with_state(service.clone()))
        .and(with_state(kind))
        .and(warp::path::full())
        .and_then(remove_watchlist_handler);

    let sample = base
        .and(warp::path("sample"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<PageParams>())
        .and(with_state(service))
        .and(with_state(kind))
        .and(warp::path::full())
        .and_then(sample_watchlist_handler);

    add.or(list)
        .unify()
        .or(remove)
        .unify()
        .or(sample)
        .unify()
        .boxed()
}

/// 200 when every symbol succeeded, 207 on a mix, 400 when all failed.
fn batch_status(results: &[SymbolResult]) -> u16 {
    let failed = results
        .iter()
        .filter(|r| r.status == ResultStatus::Failed)
        .count();
    if failed == 0 {
        200
    } else if failed < results.len() {
        207
    } else {
        400
    }
}

async fn add_watchlist_handler(
    user_id: String,
    query: SymbolsQuery,
    service: WatchlistService,
    kind: MarketKind,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let symbols = symbols_param(query, path)?;
    let results = service
        .add(&user_id, kind, &symbols)
        .await
        .map_err(|e| reject(e, path))?;

    let status = batch_status(&results);
    let message = match status {
        200 => format!("{} added to watchlist successfully.", kind.title()),
        207 => format!(
            "{} added partially. Check if the given symbols are valid.",
            kind.title()
        ),
        _ => format!("No {} added!", kind),
    };
    info!("{} added to watchlist for user '{}': {}", kind.title(), user_id, message);
    Ok(reply(&ApiResponse::ok(status, message, results, path)))
}

async fn remove_watchlist_handler(
    user_id: String,
    query: SymbolsQuery,
    service: WatchlistService,
    kind: MarketKind,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let symbols = symbols_param(query, path)?;
    let results = service
        .remove(&user_id, kind, &symbols)
        .await
        .map_err(|e| reject(e, path))?;

    let status = batch_status(&results);
    let message = match status {
        200 => format!("{} symbols successfully deleted from watchlist.", kind.title()),
        207 => format!("{} symbols deleted partially.", kind.title()),
        _ => format!("No {} symbol deleted!", kind.noun()),
    };
    info!("{} symbols deleted from watchlist for user '{}'", kind.title(), user_id);
    Ok(reply(&ApiResponse::ok(status, message, results, path)))
}

async fn list_watchlist_handler(
    user_id: String,
    params: PageParams,
    service: WatchlistService,
    kind: MarketKind,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let request = params
        .into_request(kind.symbol_field(), true)
        .map_err(|e| reject(e, path))?;
    let page = service
        .list(&user_id, kind, &request)
        .await
        .map_err(|e| reject(e, path))?;
    let message = format!("User {} watchlist received successfully.", kind);
    info!("{} for user '{}'", message, user_id);
    Ok(reply(&ApiResponse::ok(200, message, page, path)))
}

async fn sample_watchlist_handler(
    params: PageParams,
    service: WatchlistService,
    kind: MarketKind,
    path: FullPath,
) -> Result<JsonReply, Rejection> {
    let path = path.as_str();
    let request = params
        .into_request(kind.symbol_field(), true)
        .map_err(|e| reject(e, path))?;
    let page = service
        .sample(kind, &request)
        .await
        .map_err(|e| reject(e, path))?;
    let message = format!("Sample {} watchlist received successfully.", kind.noun());
    Ok(reply(&ApiResponse::ok(200, message, page, path)))
}

/// Renders every rejection as the JSON envelope.
pub async fn handle_rejection(err: Rejection) -> Result<JsonReply, Infallible> {
    let (status, message, path) = if let Some(ApiRejection { error, path }) = err.find::<ApiRejection>() {
        (error.status(), error.to_string(), path.clone())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Resource not found".to_string(), String::new())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string(), String::new())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string(), String::new())
    } else if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, e.to_string(), String::new())
    } else if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        (StatusCode::LENGTH_REQUIRED, e.to_string(), String::new())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
            String::new(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
            String::new(),
        )
    };

    if status.is_server_error() {
        error!("{} {}: {}", status.as_u16(), path, message);
    } else {
        warn!("{} {}: {}", status.as_u16(), path, message);
    }
    let response: ApiResponse<()> = ApiResponse::failure(status.as_u16(), message, &path);
    Ok(warp::reply::with_status(warp::reply::json(&response), status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ResultStatus) -> SymbolResult {
        SymbolResult {
            kind: MarketKind::Stocks,
            symbol: "A".to_string(),
            status,
            error: None,
        }
    }

    #[test]
    fn batch_status_reflects_failures() {
        use ResultStatus::*;
        assert_eq!(batch_status(&[result(Success), result(Success)]), 200);
        assert_eq!(batch_status(&[result(Success), result(Failed)]), 207);
        assert_eq!(batch_status(&[result(Failed)]), 400);
    }

    #[test]
    fn blank_symbols_are_rejected() {
        let query = SymbolsQuery {
            symbols: Some(" , ".to_string()),
        };
        assert!(symbols_param(query, "/x").is_err());
        let query = SymbolsQuery {
            symbols: Some("A, B".to_string()),
        };
        assert_eq!(symbols_param(query, "/x").unwrap(), vec!["A", "B"]);
    }
}
