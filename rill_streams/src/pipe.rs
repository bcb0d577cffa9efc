/// Threads a value through a list of functions, left to right.
///
/// `pipe!(x, f, g)` is `g(f(x))`. Combined with the curried factories of `ops` it builds
/// pipelines without nesting.
///
/// # Examples
/// ```
/// use rill_streams::{from_iter, ops, pipe, ReactiveCache};
///
/// let evens = pipe!(
///     from_iter(1..10),
///     ops::filter(|val: &i32| val % 2 == 0),
///     ops::map(|val: i32| val * 10),
///     ops::take(3),
/// );
///
/// let cache = ReactiveCache::from_stream(evens);
/// assert_eq!(cache.get_cloned(), vec![20, 40, 60]);
/// ```
#[macro_export]
macro_rules! pipe {
    ($value:expr $(,)?) => {
        $value
    };
    ($value:expr, $($function:expr),+ $(,)?) => {{
        let value = $value;
        $(
            let value = ($function)(value);
        )+
        value
    }};
}

/// Method form of `pipe!` for a single step: `value.pipe(f)` is `f(value)`.
pub trait Pipe: Sized {
    fn pipe<R, F>(self, function: F) -> R
    where
        F: FnOnce(Self) -> R,
    {
        function(self)
    }
}

impl<T> Pipe for T {}

#[cfg(test)]
mod tests {
    use super::Pipe;

    #[test]
    fn pipe_applies_left_to_right() {
        let inc = |val: i32| val + 1;
        let double = |val: i32| val * 2;

        assert_eq!(pipe!(3), 3);
        assert_eq!(pipe!(3, inc, double), double(inc(3)));
        assert_eq!(pipe!(3, double, inc), inc(double(3)));
        assert_eq!(3.pipe(inc).pipe(double), 8);
    }
}
