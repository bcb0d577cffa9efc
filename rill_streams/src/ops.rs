//! Curried forms of the stream operators, for use with `pipe!`.
//!
//! Every function here takes the operator's arguments and returns a function from the source
//! stream to the derived stream, so `ops::map(f)(stream)` is `stream.map(f)`.

use super::{Control, Error, Result, Stream, Wait, WaitSpec};
use std::rc::Rc;

pub fn map<T, U, F>(map_function: F) -> impl FnOnce(Stream<T>) -> Stream<U>
where
    T: 'static,
    U: 'static,
    F: Fn(T) -> U + 'static,
{
    move |stream| stream.map(map_function)
}

pub fn try_map<T, U, F>(map_function: F) -> impl FnOnce(Stream<T>) -> Stream<U>
where
    T: 'static,
    U: 'static,
    F: Fn(T) -> Result<U> + 'static,
{
    move |stream| stream.try_map(map_function)
}

pub fn try_filter_map<T, U, F>(op: F) -> impl FnOnce(Stream<T>) -> Stream<U>
where
    T: 'static,
    U: 'static,
    F: Fn(T) -> Result<Option<U>> + 'static,
{
    move |stream| stream.try_filter_map(op)
}

pub fn filter<T, F>(filter_function: F) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    F: Fn(&T) -> bool + 'static,
{
    move |stream| stream.filter(filter_function)
}

pub fn try_filter<T, F>(filter_function: F) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    F: Fn(&T) -> Result<bool> + 'static,
{
    move |stream| stream.try_filter(filter_function)
}

/// Tap: calls `inspect_function` with every value passing through.
pub fn inspect<T, F>(inspect_function: F) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    F: Fn(&T) + 'static,
{
    move |stream| stream.inspect(inspect_function)
}

pub fn finalize<T, F>(finalize_function: F) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    F: Fn(Option<&Error>) + 'static,
{
    move |stream| stream.finalize(finalize_function)
}

pub fn on_greet<T, F>(greet_function: F) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    F: Fn(&Rc<dyn Control>) + 'static,
{
    move |stream| stream.on_greet(greet_function)
}

pub fn scan<T, U, F>(scan_fn: F, initial_value: U) -> impl FnOnce(Stream<T>) -> Stream<U>
where
    T: 'static,
    U: Clone + 'static,
    F: Fn(&U, T) -> U + 'static,
{
    move |stream| stream.scan(scan_fn, initial_value)
}

pub fn try_scan<T, U, F>(scan_fn: F, initial_value: U) -> impl FnOnce(Stream<T>) -> Stream<U>
where
    T: 'static,
    U: Clone + 'static,
    F: Fn(&U, T) -> Result<U> + 'static,
{
    move |stream| stream.try_scan(scan_fn, initial_value)
}

pub fn count_values<T: 'static>() -> impl FnOnce(Stream<T>) -> Stream<u32> {
    |stream| stream.count_values()
}

pub fn distinct<T: Clone + PartialEq + 'static>() -> impl FnOnce(Stream<T>) -> Stream<T> {
    |stream| stream.distinct()
}

pub fn distinct_by<T, F>(equals: F) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: Clone + 'static,
    F: Fn(&T, &T) -> bool + 'static,
{
    move |stream| stream.distinct_by(equals)
}

pub fn take<T: 'static>(max: usize) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.take(max)
}

pub fn retry<T: 'static>(max_retries: Option<usize>) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.retry(max_retries)
}

pub fn start_with<T: Clone + 'static>(values: Vec<T>) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.start_with(values)
}

pub fn append<T: 'static>(others: Vec<Stream<T>>) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.append(others)
}

pub fn prepend<T: 'static>(others: Vec<Stream<T>>) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.prepend(others)
}

pub fn until<T: 'static, U: 'static>(gate: Stream<U>) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.until(&gate)
}

pub fn buffer<T: 'static>(max: usize) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.buffer(max)
}

pub fn backpress<T: 'static>() -> impl FnOnce(Stream<T>) -> Stream<T> {
    |stream| stream.backpress()
}

pub fn auto_request<T: 'static>() -> impl FnOnce(Stream<T>) -> Stream<T> {
    |stream| stream.auto_request()
}

pub fn debounce<T, W>(notifier: W) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    W: Into<WaitSpec<T>>,
{
    move |stream| stream.debounce(notifier)
}

pub fn throttle<T, W>(notifier: W) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    W: Into<WaitSpec<T>>,
{
    move |stream| stream.throttle(notifier)
}

pub fn pullrate<T: 'static>(rate: Wait) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.pullrate(rate)
}

pub fn pull_after<T, F>(task: F) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: 'static,
    F: Fn(&T) -> Result<Option<Wait>> + 'static,
{
    move |stream| stream.pull_after(task)
}

pub fn connect_rate<T: 'static>(rate: Wait) -> impl FnOnce(Stream<T>) -> Stream<T> {
    move |stream| stream.connect_rate(rate)
}

pub fn flatten<T: 'static>() -> impl FnOnce(Stream<Stream<T>>) -> Stream<T> {
    |stream| stream.flatten()
}

pub fn switch_map<T, U, F>(map_function: F) -> impl FnOnce(Stream<T>) -> Stream<U>
where
    T: 'static,
    U: 'static,
    F: Fn(T) -> Stream<U> + 'static,
{
    move |stream| stream.switch_map(map_function)
}

pub fn share<T: Clone + 'static>() -> impl FnOnce(Stream<T>) -> Stream<T> {
    |stream| stream.share()
}

pub fn replay<T: Clone + 'static>() -> impl FnOnce(Stream<T>) -> Stream<T> {
    |stream| stream.replay()
}
