pub trait Job: FnOnce() + Send + 'static {}
impl<F: FnOnce() + Send + 'static> Job for F {}

pub trait Reply: Send + 'static {}
impl<T: Send + 'static> Reply for T {}
