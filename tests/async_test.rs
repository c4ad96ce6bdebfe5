use std::sync::{Arc, Mutex};

use hostbridge::value::String as JsString;
use hostbridge::{AsyncWork, AsyncWorker, Env, Function, Number, Object, Result, Runtime, Value};

struct Square {
    input: f64,
    output: f64,
}

impl AsyncWork for Square {
    fn execute(&mut self) -> std::result::Result<(), String> {
        self.output = self.input * self.input;
        Ok(())
    }

    fn on_ok(&mut self, env: &Env) -> Result<Vec<Value>> {
        Ok(vec![Number::new(env, self.output)?.into()])
    }
}

struct Silent;

impl AsyncWork for Silent {
    fn execute(&mut self) -> std::result::Result<(), String> {
        Ok(())
    }
}

struct Failing;

impl AsyncWork for Failing {
    fn execute(&mut self) -> std::result::Result<(), String> {
        Err("boom".to_string())
    }
}

#[derive(Default)]
struct Observed {
    calls: usize,
    arg_count: usize,
    number: Option<f64>,
    message: Option<String>,
}

fn observing_callback(env: &Env, observed: Arc<Mutex<Observed>>) -> Function {
    Function::new(env, "done", move |info| {
        let mut seen = observed.lock().unwrap();
        seen.calls += 1;
        seen.arg_count = info.len();
        if info.len() > 0 {
            let arg = info.get(0)?;
            if arg.is_number()? {
                seen.number = Some(arg.cast::<Number>().value()?);
            } else {
                let message = arg.coerce_to_object()?.get("message")?;
                seen.message = Some(message.cast::<JsString>().to_utf8()?);
            }
        }
        info.env().undefined()
    })
    .unwrap()
}

#[test]
fn successful_work_reports_through_on_ok() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let observed = Arc::new(Mutex::new(Observed::default()));
    let callback = observing_callback(&env, observed.clone());
    let receiver = Object::new(&env).unwrap();
    let worker = AsyncWorker::new(
        &env,
        &receiver,
        &callback,
        Square {
            input: 3.0,
            output: 0.0,
        },
    )
    .unwrap();
    worker.queue().unwrap();
    rt.run_until_idle();

    let seen = observed.lock().unwrap();
    assert_eq!(seen.calls, 1);
    assert_eq!(seen.arg_count, 1);
    assert_eq!(seen.number, Some(9.0));
}

#[test]
fn default_success_callback_receives_no_arguments() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let observed = Arc::new(Mutex::new(Observed::default()));
    let callback = observing_callback(&env, observed.clone());
    let receiver = Object::new(&env).unwrap();
    AsyncWorker::new(&env, &receiver, &callback, Silent)
        .unwrap()
        .queue()
        .unwrap();
    rt.run_until_idle();

    let seen = observed.lock().unwrap();
    assert_eq!(seen.calls, 1);
    assert_eq!(seen.arg_count, 0);
}

#[test]
fn failing_work_reports_the_error_message_exactly() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let observed = Arc::new(Mutex::new(Observed::default()));
    let callback = observing_callback(&env, observed.clone());
    let receiver = Object::new(&env).unwrap();
    AsyncWorker::new(&env, &receiver, &callback, Failing)
        .unwrap()
        .queue()
        .unwrap();
    rt.run_until_idle();

    let seen = observed.lock().unwrap();
    assert_eq!(seen.calls, 1);
    assert_eq!(seen.arg_count, 1);
    assert_eq!(seen.message.as_deref(), Some("boom"));
}

#[test]
fn completions_for_multiple_workers_all_arrive() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let observed = Arc::new(Mutex::new(Observed::default()));
    let callback = observing_callback(&env, observed.clone());
    let receiver = Object::new(&env).unwrap();
    for input in [1.0, 2.0, 3.0] {
        AsyncWorker::new(
            &env,
            &receiver,
            &callback,
            Square {
                input,
                output: 0.0,
            },
        )
        .unwrap()
        .queue()
        .unwrap();
    }
    assert!(rt.pending_async_work() > 0);
    rt.run_until_idle();
    assert_eq!(rt.pending_async_work(), 0);
    assert_eq!(observed.lock().unwrap().calls, 3);
}
