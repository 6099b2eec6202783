macro_rules! set_field {
    ($cat:ident, $self:ident, $name:ident, $field:expr, ($val:expr)) => {
        {
            gstreamer::debug!(
                $cat,
                imp: $self,
                "Changing {} from {} to {}",
                Into::<&str>::into($name),
                $field,
                $val,
            );
            $field = $val;
        }
    };
    ($cat:ident, $self:ident, $name:ident, $field:expr, $value:ident) => {
        {
            let Ok(new_value) = $value.get() else {
                gstreamer::warning!(
                    $cat,
                    imp: $self,
                    "Ignoring value of type {} for {}",
                    $value.type_(),
                    Into::<&str>::into($name),
                );
                return;
            };
            set_field!($cat, $self, $name, $field, (new_value));
        }
    };
}

pub(crate) use set_field;
