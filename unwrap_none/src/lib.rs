use core::fmt::Debug;

pub trait UnwrapNone {
    fn unwrap_none(self);

    fn expect_none(self, message: &str);
}

impl<T: Debug> UnwrapNone for Option<T> {
    #[track_caller]
    fn unwrap_none(self) {
        if let Some(value) = self {
            panic!("called `Option::unwrap_none()` on a `Some` value: {value:?}");
        }
    }

    #[track_caller]
    fn expect_none(self, message: &str) {
        if let Some(value) = self {
            panic!("{message}: {value:?}");
        }
    }
}
