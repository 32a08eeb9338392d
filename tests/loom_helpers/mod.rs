use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;

/// Counts how many times each expected outcome was observed across loom
/// iterations.
pub struct Statemap {
    states: BTreeMap<usize, BTreeMap<usize, AtomicUsize>>,
}

macro_rules! statemap {
    ($($key:literal => [$($value:literal),*$(,)?]),*$(,)?) => {{
        #[allow(unused_mut)]
        let mut states = ::std::collections::BTreeMap::new();
        $(
            states.insert($key, {
                #[allow(unused_mut)]
                let mut inner = ::std::collections::BTreeMap::new();
                $(inner.insert($value, ::std::sync::atomic::AtomicUsize::new(0));)*
                inner
            });
        )*
        $crate::loom_helpers::Statemap::leak(states)
    }};
}

impl Statemap {
    pub fn leak(states: BTreeMap<usize, BTreeMap<usize, AtomicUsize>>) -> &'static Self {
        Box::leak(Box::new(Self { states }))
    }

    #[track_caller]
    pub fn put(&self, key: usize, value: usize) {
        let Some(values) = self.states.get(&key) else {
            panic!("unexpected state key {key} (=> {value})");
        };
        let Some(counter) = values.get(&value) else {
            panic!("unexpected state {key} => {value}");
        };
        counter.fetch_add(1, SeqCst);
    }

    #[track_caller]
    pub fn check_exhaustive(&self) {
        for (key, values) in &self.states {
            for (value, counter) in values {
                assert!(counter.load(SeqCst) != 0, "{key} => {value} never observed");
            }
        }
    }
}
