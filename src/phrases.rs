use rand::Rng;

/// Chooses one entry from a fixed phrase table.
///
/// Production code picks uniformly at random; tests plug in
/// [`FirstPicker`] to make replies reproducible.
pub trait PhrasePicker: Send + Sync {
    /// Return an index in `0..len`. Only called with `len > 0`.
    fn pick_index(&self, len: usize) -> usize;
}

/// Uniform random selection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPicker;

impl PhrasePicker for RandomPicker {
    fn pick_index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Always the first entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstPicker;

impl PhrasePicker for FirstPicker {
    fn pick_index(&self, _len: usize) -> usize {
        0
    }
}

/// Pick one option, or `None` for an empty table.
pub fn choose<'a, T>(picker: &dyn PhrasePicker, options: &'a [T]) -> Option<&'a T> {
    if options.is_empty() {
        return None;
    }
    let index = picker.pick_index(options.len()).min(options.len() - 1);
    options.get(index)
}
