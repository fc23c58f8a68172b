//! A thin hyper host for the decision engine: buffers the request body, runs
//! the traversal, and converts the finished response back into a hyper one.
//! Dispatch is exact-path only; anything richer belongs to an outer router.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::sync::mpsc;
use futures::{Future, Stream};
use hyper::header::ContentLength;
use hyper::server::{Http, Request, Response, Service};
use hyper::{Chunk, Method, StatusCode};

use crate::decision;
use crate::resource::Resource;
use crate::types::{self, HasRestState, ResponseBody};

const FILE_CHUNK_SIZE: usize = 64 * 1024;

struct Dirigible<R, S, F>
where
    R: Resource<S> + Clone,
    S: HasRestState,
    F: Fn() -> S,
{
    routes: Arc<HashMap<String, R>>,
    new_request_state: F,
}

impl<R, S, F> Service for Dirigible<R, S, F>
where
    R: Resource<S> + Clone + 'static,
    S: HasRestState + 'static,
    F: Fn() -> S,
{
    type Request = Request;
    type Response = Response;
    type Error = hyper::Error;
    type Future = Box<dyn Future<Item = Response, Error = hyper::Error>>;

    fn call(&self, req: Request) -> Self::Future {
        let (method, uri, _version, headers, body) = req.deconstruct();
        let resource = match self.routes.get(uri.path()) {
            Some(resource) => resource.clone(),
            None => {
                return Box::new(futures::future::ok(
                    Response::new().with_status(StatusCode::NotFound),
                ));
            }
        };
        let mut state = (self.new_request_state)();
        Box::new(body.concat2().map(move |chunk| {
            let head = method.clone();
            let request =
                types::Request::new(method, uri, headers, chunk.to_vec());
            let finished =
                decision::traverse(&resource, &request, &mut state);
            into_hyper_response(finished, &head)
        }))
    }
}

fn into_hyper_response(
    finished: types::Response,
    method: &Method,
) -> Response {
    let mut finished = finished;
    let mut response = Response::new();
    if let Some(status) = finished.status() {
        response.set_status(status);
    }
    let body = finished.take_body();
    *response.headers_mut() = std::mem::replace(
        finished.headers_mut(),
        hyper::header::Headers::new(),
    );

    let body = match body {
        Some(body) => body,
        None => return response,
    };
    if *method == Method::Head {
        if let ResponseBody::Bytes(ref bytes) = body {
            response
                .headers_mut()
                .set(ContentLength(bytes.len() as u64));
        }
        return response;
    }
    match body {
        ResponseBody::Bytes(bytes) => {
            response
                .headers_mut()
                .set(ContentLength(bytes.len() as u64));
            response.set_body(bytes);
        }
        ResponseBody::Chunks(chunks) => {
            set_chunked_body(&mut response, chunks);
        }
        ResponseBody::File(path) => match fs::read(&path) {
            Ok(bytes) => {
                let chunks = bytes
                    .chunks(FILE_CHUNK_SIZE)
                    .map(|chunk| chunk.to_vec())
                    .collect();
                set_chunked_body(&mut response, chunks);
            }
            Err(err) => {
                log::error!(
                    "failed to read response file {}: {}",
                    path.display(),
                    err
                );
                response.set_status(StatusCode::InternalServerError);
            }
        },
    }
    response
}

fn set_chunked_body(response: &mut Response, chunks: Vec<Vec<u8>>) {
    let (mut tx, rx) =
        mpsc::channel::<Result<Chunk, hyper::Error>>(chunks.len() + 1);
    for chunk in chunks {
        if tx.try_send(Ok(Chunk::from(chunk))).is_err() {
            break;
        }
    }
    drop(tx);
    response.set_body(rx);
}

/// Serves the given resources until the process is stopped. Each request
/// gets a fresh state from `state_fun` and runs through the decision graph.
pub fn run<R, S>(
    addr: SocketAddr,
    routes: &[(&str, R)],
    state_fun: &'static (dyn Fn() -> S + Send + Sync),
) where
    R: Resource<S> + Clone + 'static,
    S: HasRestState + 'static,
{
    let table: HashMap<String, R> = routes
        .iter()
        .map(|(path, resource)| ((*path).to_string(), resource.clone()))
        .collect();
    let table = Arc::new(table);
    let server = Http::new()
        .bind(&addr, move || {
            Ok(Dirigible {
                routes: Arc::clone(&table),
                new_request_state: state_fun,
            })
        })
        .unwrap();
    server.run().unwrap();
}
