use bson::{Bson, Document};
use std::cmp::Ordering;

pub fn is_numeric(b: &Bson) -> bool {
    matches!(
        b,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
    )
}

/// Decimal128 is compared through its double value; the fixtures never need
/// more than double precision.
pub fn numeric_to_double(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        Bson::Decimal128(d) => d.to_string().parse().ok(),
        _ => None,
    }
}

pub fn numeric_to_i64(b: &Bson) -> Option<i64> {
    match b {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => numeric_to_double(b).map(|d| d as i64),
    }
}

/// Values of different types order by their type first, the way the server
/// does: missing, null, numbers, strings, documents, arrays, binary data,
/// object ids, booleans, dates, timestamps. A missing field is represented
/// by `Bson::Undefined`.
pub(crate) fn type_rank(b: &Bson) -> u8 {
    match b {
        Bson::Undefined => 0,
        Bson::Null => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        _ => 12,
    }
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(_) | Bson::Int32(_), Bson::Int64(_) | Bson::Int32(_)) => {
            numeric_to_i64(a).cmp(&numeric_to_i64(b))
        }
        _ if is_numeric(a) => compare_doubles(
            numeric_to_double(a).unwrap_or(f64::NAN),
            numeric_to_double(b).unwrap_or(f64::NAN),
        ),
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => compare_arrays(x, y),
        (Bson::Binary(x), Bson::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then_with(|| u8::from(x.subtype).cmp(&u8::from(y.subtype)))
            .then_with(|| x.bytes.cmp(&y.bytes)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        _ => Ordering::Equal,
    }
}

/// NaN sorts below every other number.
fn compare_doubles(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn compare_documents(x: &Document, y: &Document) -> Ordering {
    for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
        let ordering = compare_bson(xv, yv).then_with(|| xk.cmp(yk));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    x.len().cmp(&y.len())
}

fn compare_arrays(x: &[Bson], y: &[Bson]) -> Ordering {
    for (xv, yv) in x.iter().zip(y.iter()) {
        let ordering = compare_bson(xv, yv);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    x.len().cmp(&y.len())
}

/// Equality across numeric types, so `1 == 1.0`.
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    compare_bson(a, b) == Ordering::Equal
}

/// `false`, null, missing and numeric zero are falsy; everything else is
/// truthy.
pub fn is_truthy(b: &Bson) -> bool {
    match b {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        _ if is_numeric(b) => numeric_to_double(b).is_some_and(|d| d != 0.0),
        _ => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bson::bson;

    #[test]
    fn null_sorts_before_numbers_and_numbers_before_strings() {
        assert_eq!(Ordering::Less, compare_bson(&Bson::Null, &bson!(-5)));
        assert_eq!(Ordering::Less, compare_bson(&bson!(100), &bson!("1")));
    }

    #[test]
    fn missing_sorts_below_null_and_differs_from_it() {
        assert_eq!(Ordering::Less, compare_bson(&Bson::Undefined, &Bson::Null));
        assert!(!bson_eq(&Bson::Undefined, &Bson::Null));
        assert!(!is_truthy(&Bson::Undefined));
    }

    #[test]
    fn numbers_compare_across_types() {
        assert!(bson_eq(&bson!(1), &bson!(1.0)));
        assert!(bson_eq(&Bson::Int64(3), &Bson::Int32(3)));
        assert_eq!(Ordering::Greater, compare_bson(&bson!(2.5), &Bson::Int64(2)));
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&bson!(0)));
        assert!(!is_truthy(&Bson::Null));
        assert!(is_truthy(&bson!("")));
        assert!(is_truthy(&bson!([])));
    }
}
