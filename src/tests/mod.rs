mod test_fixed_window_rate_limiter;
mod test_local_store;
