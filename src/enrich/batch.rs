use std::future::Future;

use futures::future::join_all;

/// Runs `f` over `items` in consecutive groups of `group_size`.
///
/// The futures of one group are polled concurrently on the current task and
/// the whole group settles before the next group starts, so at most
/// `group_size` calls are ever in flight. Results come back in input order.
/// A `group_size` of zero is treated as one.
pub async fn process_in_groups<T, R, F, Fut>(items: Vec<T>, group_size: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let group_size = group_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let group: Vec<Fut> = items.by_ref().take(group_size).map(&f).collect();
        results.extend(join_all(group).await);
    }

    results
}

/// Sizes of the groups [`process_in_groups`] forms for `len` items.
pub fn group_sizes(len: usize, group_size: usize) -> Vec<usize> {
    let group_size = group_size.max(1);
    (0..len)
        .step_by(group_size)
        .map(|start| (len - start).min(group_size))
        .collect()
}
