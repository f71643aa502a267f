#[macro_export]
macro_rules! tvar {
    ($v:expr) => {
        $crate::TyVar($v)
    };
}

#[macro_export]
macro_rules! subst {
    () => {
        $crate::Subst::new()
    };

    ( $( $k:expr => $v:expr ),+ $(,)? ) => {{
        let mut s = $crate::Subst::new();
        $(s.insert($k, $v);)+
        s
    }};
}
