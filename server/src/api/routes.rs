use crate::api::model::{ErrorBody, RemovedBody};
use crate::service::SpecService;
use devicecore::{DeviceError, Record};
use log::{error, warn};
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};
use warp::{Filter, Rejection};

/// Largest accepted submission body.
const MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

fn with_service(
    service: SpecService,
) -> impl Filter<Extract = (SpecService,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

fn error_reply(err: &DeviceError, status: StatusCode) -> Response {
    reply::with_status(reply::json(&ErrorBody::from(err)), status).into_response()
}

/// Store failures are server errors everywhere except submission, where
/// every failure is reported as 400.
fn store_failure(err: &DeviceError) -> Response {
    error!("store call failed: {}", err);
    error_reply(err, StatusCode::INTERNAL_SERVER_ERROR)
}

/// All HTTP routes of the service.
pub fn routes(
    service: SpecService,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let submit = warp::path!("specs")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(submit_batch);

    let list = warp::path!("specs")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(list_records);

    let clear = warp::path!("specs")
        .and(warp::delete())
        .and(with_service(service.clone()))
        .and_then(delete_records);

    let stat = warp::path!("stat" / String / String)
        .and(warp::get())
        .and(with_service(service))
        .and_then(rank_device);

    submit
        .or(list)
        .unify()
        .or(clear)
        .unify()
        .or(stat)
        .unify()
        .recover(handle_rejection)
        .with(warp::log("deviceserver::http"))
}

async fn submit_batch(batch: Record, service: SpecService) -> Result<Response, Rejection> {
    match service.ingest(batch).await {
        Ok(stored) => {
            Ok(reply::with_status(reply::json(&stored), StatusCode::CREATED).into_response())
        }
        Err(err) => {
            if err.is_client_error() {
                warn!("rejected batch: {}", err);
            } else {
                error!("batch not stored: {}", err);
            }
            Ok(error_reply(&err, StatusCode::BAD_REQUEST))
        }
    }
}

async fn list_records(service: SpecService) -> Result<Response, Rejection> {
    match service.list().await {
        Ok(records) => Ok(reply::json(&records).into_response()),
        Err(err) => Ok(store_failure(&err)),
    }
}

async fn delete_records(service: SpecService) -> Result<Response, Rejection> {
    match service.delete_all().await {
        Ok(removed) => Ok(reply::json(&RemovedBody { removed }).into_response()),
        Err(err) => Ok(store_failure(&err)),
    }
}

/// Path parameters arrive still percent-encoded.
fn decode_segment(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

async fn rank_device(
    mac: String,
    sensor: String,
    service: SpecService,
) -> Result<Response, Rejection> {
    let (Some(mac), Some(sensor)) = (decode_segment(&mac), decode_segment(&sensor)) else {
        // no stored identifier can match bytes that are not UTF-8
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    match service.rank(sensor, mac).await {
        Ok(Some(ranking)) => Ok(reply::json(&ranking).into_response()),
        Ok(None) => Ok(StatusCode::NOT_FOUND.into_response()),
        Err(err) => Ok(store_failure(&err)),
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    if rejection.is_not_found() {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        let body = ErrorBody::new("ValidationError", err.to_string());
        return Ok(reply::with_status(reply::json(&body), StatusCode::BAD_REQUEST).into_response());
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        let body = ErrorBody::new("ValidationError", "request body too large");
        return Ok(
            reply::with_status(reply::json(&body), StatusCode::PAYLOAD_TOO_LARGE).into_response(),
        );
    }
    if rejection.find::<warp::reject::LengthRequired>().is_some() {
        let body = ErrorBody::new("ValidationError", "content-length header is required");
        return Ok(
            reply::with_status(reply::json(&body), StatusCode::LENGTH_REQUIRED).into_response(),
        );
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        let body = ErrorBody::new("ValidationError", "expected application/json body");
        return Ok(reply::with_status(
            reply::json(&body),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        )
        .into_response());
    }
    warn!("unhandled rejection: {:?}", rejection);
    Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
