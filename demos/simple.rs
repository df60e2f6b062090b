use std::sync::atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, time::SystemTime};

use trellis::*;

// Define regular structs

#[derive(Default)]
struct Logger;

impl Logger {
    fn log(&self, content: &str) {
        println!("{}", content);
    }
}

struct DateLogger {
    logger: Arc<Logger>,
}

impl DateLogger {
    fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    fn log_date(&self) {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.logger.log(&format!("{}s since epoch", secs));
    }
}

struct Request {
    id: usize,
}

struct Formatter(&'static str);

// Describe them as parts

fn parts() -> Vec<PartDescriptor> {
    let formatter = |name: &'static str, order: i64| {
        PartDescriptor::new(name)
            .export_declaration(ExportDeclaration::new(Contract::named("Formatter")).with_metadata("Order", order))
            .constructor(ConstructorDescriptor::new(vec![], move || Formatter(name)))
    };

    let next_id = Arc::new(AtomicUsize::new(1));

    vec![
        PartDescriptor::new("Logger")
            .export(Contract::named("Logger"))
            .shared()
            .constructor(ConstructorDescriptor::default_of::<Logger>()),
        export_part!(
            "DateLogger" => [Contract::named("DateLogger")],
            DateLogger::new,
            logger: Contract::named("Logger")
        ),
        PartDescriptor::new("Request")
            .export(Contract::named("Request"))
            .shared_within("Request")
            .constructor(ConstructorDescriptor::new(vec![], move || Request {
                id: next_id.fetch_add(1, Ordering::Relaxed),
            }))
            .on_release(|request: &Request| println!("released request {}", request.id)),
        formatter("json", 2),
        formatter("text", 1),
    ]
}

fn main() -> Result<()> {
    let host = ContainerConfiguration::new().with_parts(parts()).create_container();

    let date_logger: Arc<DateLogger> = host.get(&Contract::named("DateLogger"))?;
    date_logger.log_date();

    let formatters: Arc<Vec<Instance>> = host.get(&Contract::named("Formatter").ordered_by("Order"))?;
    for formatter in formatters.iter().filter_map(|f| f.downcast_ref::<Formatter>()) {
        date_logger.logger.log(&format!("formatter: {}", formatter.0));
    }

    let scope = host.begin_scope(&["Request"]);
    let request: Arc<Request> = scope.get(&Contract::named("Request"))?;
    date_logger.logger.log(&format!("handling request {}", request.id));
    scope.dispose();

    host.dispose();
    Ok(())
}
