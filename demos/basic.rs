use dirigible::headers::MediaType;
use dirigible::resource::{Outcome, Producer, Resource};
use dirigible::server;
use dirigible::types::{Request, RequestState, ResponseBody};

fn to_text(
    _req: &Request,
    _state: &mut RequestState,
) -> Outcome<ResponseBody> {
    Outcome::Value(ResponseBody::from("This is REST!\n"))
}

#[derive(Clone)]
struct Greeting;

impl Resource<RequestState> for Greeting {
    fn content_types_provided(
        &self,
        _req: &Request,
        _state: &mut RequestState,
    ) -> Outcome<Vec<(MediaType, Producer<RequestState>)>> {
        Outcome::Value(vec![(
            MediaType::new("text", "plain"),
            to_text as Producer<RequestState>,
        )])
    }
}

fn main() {
    env_logger::init();
    let addr = "127.0.0.1:3000".parse().unwrap();
    let routes = vec![("/greeting", Greeting)];
    server::run(addr, &routes, &RequestState::new);
}
