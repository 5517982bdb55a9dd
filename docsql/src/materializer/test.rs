use super::*;
use crate::{ir::*, util::builders::*};
use bson::{doc, spec::BinarySubtype, Binary};
use chrono::TimeZone;

macro_rules! test_convert {
    ($func_name:ident, expected = $expected:expr, input = $input:expr, column_type = $column_type:expr) => {
        #[test]
        fn $func_name() {
            assert_eq!($expected, convert(&$input, $column_type));
        }
    };
}

macro_rules! test_column_type {
    ($func_name:ident, expected = $expected:expr, input = $input:expr) => {
        #[test]
        fn $func_name() {
            assert_eq!($expected, resolve_column_type(&$input));
        }
    };
}

mod exact {
    use super::*;

    test_convert!(
        null_is_null_for_any_type,
        expected = Value::Null,
        input = Bson::Null,
        column_type = ColumnType::Int32
    );
    test_convert!(
        int32_widens_to_int64,
        expected = Value::Int64(7),
        input = Bson::Int32(7),
        column_type = ColumnType::Int64
    );
    test_convert!(
        double_truncates_to_int32,
        expected = Value::Int32(3),
        input = Bson::Double(3.9),
        column_type = ColumnType::Int32
    );
    test_convert!(
        int64_narrows_to_byte,
        expected = Value::Byte(44),
        input = Bson::Int64(300),
        column_type = ColumnType::Byte
    );
    test_convert!(
        numeric_string_to_int16,
        expected = Value::Int16(-12),
        input = Bson::String(" -12 ".to_string()),
        column_type = ColumnType::Int16
    );
    test_convert!(
        int_to_boolean,
        expected = Value::Boolean(true),
        input = Bson::Int32(2),
        column_type = ColumnType::Boolean
    );
    test_convert!(
        zero_to_boolean,
        expected = Value::Boolean(false),
        input = Bson::Double(0.0),
        column_type = ColumnType::Boolean
    );
    test_convert!(
        string_to_boolean_ignores_case,
        expected = Value::Boolean(true),
        input = Bson::String("True".to_string()),
        column_type = ColumnType::Boolean
    );
    test_convert!(
        unreadable_boolean_is_false,
        expected = Value::Boolean(false),
        input = Bson::String("yes".to_string()),
        column_type = ColumnType::Boolean
    );
    test_convert!(
        string_to_char_takes_first,
        expected = Value::Char('x'),
        input = Bson::String("xyz".to_string()),
        column_type = ColumnType::Char
    );
    test_convert!(
        empty_string_to_char,
        expected = Value::Char('\0'),
        input = Bson::String(String::new()),
        column_type = ColumnType::Char
    );
    test_convert!(
        decimal_stays_decimal,
        expected = Value::Decimal("12.50".parse().unwrap()),
        input = Bson::Decimal128("12.50".parse().unwrap()),
        column_type = ColumnType::Decimal
    );
    test_convert!(
        double_to_decimal,
        expected = Value::Decimal("2.5".parse().unwrap()),
        input = Bson::Double(2.5),
        column_type = ColumnType::Decimal
    );
    test_convert!(
        decimal_to_double,
        expected = Value::Double(12.5),
        input = Bson::Decimal128("12.50".parse().unwrap()),
        column_type = ColumnType::Double
    );
    test_convert!(
        int_to_string,
        expected = Value::String("42".to_string()),
        input = Bson::Int32(42),
        column_type = ColumnType::String
    );
    test_convert!(
        date_time,
        expected = Value::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()),
        input = Bson::DateTime(bson::DateTime::from_chrono(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
        )),
        column_type = ColumnType::DateTime
    );
    test_convert!(
        rfc3339_string_to_date_time,
        expected = Value::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()),
        input = Bson::String("2024-03-01T10:30:00+02:00".to_string()),
        column_type = ColumnType::DateTime
    );
    test_convert!(
        plain_date_string_to_date,
        expected = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        input = Bson::String("2024-03-01".to_string()),
        column_type = ColumnType::Date
    );
    test_convert!(
        date_time_to_time,
        expected = Value::Time(NaiveTime::from_hms_opt(10, 30, 0).unwrap()),
        input = Bson::DateTime(bson::DateTime::from_chrono(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
        )),
        column_type = ColumnType::Time
    );
    test_convert!(
        number_to_date_is_first_day,
        expected = Value::Date(NaiveDate::from_ymd_opt(1, 1, 1).unwrap()),
        input = Bson::Int32(5),
        column_type = ColumnType::Date
    );
    test_convert!(
        ticks_to_time_span,
        expected = Value::TimeSpan(Duration::seconds(90)),
        input = Bson::Int64(900_000_000),
        column_type = ColumnType::TimeSpan
    );
    test_convert!(
        string_to_time_span,
        expected = Value::TimeSpan(
            Duration::days(1) + Duration::hours(2) + Duration::minutes(3) + Duration::milliseconds(4500)
        ),
        input = Bson::String("1.02:03:04.5".to_string()),
        column_type = ColumnType::TimeSpan
    );
    test_convert!(
        negative_time_span,
        expected = Value::TimeSpan(-Duration::minutes(90)),
        input = Bson::String("-01:30".to_string()),
        column_type = ColumnType::TimeSpan
    );
    test_convert!(
        unreadable_time_span_is_zero,
        expected = Value::TimeSpan(Duration::zero()),
        input = Bson::String("soon".to_string()),
        column_type = ColumnType::TimeSpan
    );
    test_convert!(
        string_to_guid,
        expected = Value::Guid(Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap()),
        input = Bson::String("67e55044-10b1-426f-9247-bb680e5fe0c8".to_string()),
        column_type = ColumnType::Guid
    );
    test_convert!(
        binary_to_guid,
        expected = Value::Guid(Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap()),
        input = Bson::Binary(Binary::from_uuid(
            Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap()
        )),
        column_type = ColumnType::Guid
    );
    test_convert!(
        binary_to_bytes,
        expected = Value::Bytes(vec![1, 2, 3]),
        input = Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![1, 2, 3]
        }),
        column_type = ColumnType::ByteArray
    );
    test_convert!(
        non_binary_to_bytes_is_null,
        expected = Value::Null,
        input = Bson::Int32(1),
        column_type = ColumnType::ByteArray
    );
}

mod loose {
    use super::*;

    test_convert!(
        unknown_type_keeps_native_int,
        expected = Value::Int64(9),
        input = Bson::Int64(9),
        column_type = ColumnType::Unknown
    );
    test_convert!(
        unreadable_int_falls_back_to_string,
        expected = Value::String("abc".to_string()),
        input = Bson::String("abc".to_string()),
        column_type = ColumnType::Int32
    );
    test_convert!(
        unreadable_guid_falls_back_to_native,
        expected = Value::Int32(5),
        input = Bson::Int32(5),
        column_type = ColumnType::Guid
    );
    test_convert!(
        object_id_is_hex,
        expected = Value::String("65f1a2b3c4d5e6f708091011".to_string()),
        input = Bson::ObjectId(bson::oid::ObjectId::parse_str("65f1a2b3c4d5e6f708091011").unwrap()),
        column_type = ColumnType::Unknown
    );
    test_convert!(
        array_elements_convert_loosely,
        expected = Value::Array(vec![Value::Int32(1), Value::Null, Value::String("a".to_string())]),
        input = Bson::Array(vec![Bson::Int32(1), Bson::Null, Bson::String("a".to_string())]),
        column_type = ColumnType::Unknown
    );
    test_convert!(
        document_is_kept,
        expected = Value::Document(doc! {"a": 1}),
        input = Bson::Document(doc! {"a": 1}),
        column_type = ColumnType::Int32
    );
}

mod column_types {
    use super::*;

    test_column_type!(
        declared_column_type,
        expected = ColumnType::Decimal,
        input = typed_col("Price", ColumnType::Decimal)
    );
    test_column_type!(
        constant_type,
        expected = ColumnType::String,
        input = string("a")
    );
    test_column_type!(count_is_int32, expected = ColumnType::Int32, input = count());
    test_column_type!(
        exists_is_boolean,
        expected = ColumnType::Boolean,
        input = subquery(AggregateKind::Exists, None, statement("Orders", "O"))
    );
    test_column_type!(
        avg_of_integers_is_int32,
        expected = ColumnType::Int32,
        input = aggregate(AggregateKind::Avg, typed_col("Qty", ColumnType::Int64))
    );
    test_column_type!(
        avg_of_decimal_is_decimal,
        expected = ColumnType::Decimal,
        input = aggregate(AggregateKind::Avg, typed_col("Price", ColumnType::Decimal))
    );
    test_column_type!(
        avg_of_unknown_is_double,
        expected = ColumnType::Double,
        input = aggregate(AggregateKind::Avg, col("Price"))
    );
    test_column_type!(
        max_takes_target_type,
        expected = ColumnType::DateTime,
        input = aggregate(AggregateKind::Max, typed_col("Shipped", ColumnType::DateTime))
    );
    test_column_type!(
        custom_aggregate_is_unknown,
        expected = ColumnType::Unknown,
        input = aggregate(AggregateKind::Custom("Median".to_string()), col("Price"))
    );
    test_column_type!(
        to_long_is_int64,
        expected = ColumnType::Int64,
        input = func(Function::ToLong, vec![col("Qty")])
    );
    test_column_type!(
        date_part_is_int32,
        expected = ColumnType::Int32,
        input = func(Function::GetDayOfWeek, vec![col("Shipped")])
    );
    test_column_type!(
        iif_takes_then_branch_type,
        expected = ColumnType::Boolean,
        input = func(Function::Iif, vec![boolean(true), boolean(false), int(1)])
    );
    test_column_type!(
        other_function_is_unknown,
        expected = ColumnType::Unknown,
        input = func(Function::Upper, vec![col("Name")])
    );
}

mod materialize {
    use super::*;

    fn orders() -> Statement {
        Statement {
            operands: vec![
                output(Expression::column(Some("N0"), "Qty", ColumnType::Int32)),
                output(Expression::column(Some("N0"), "Price", ColumnType::Decimal)),
                output_as(count(), "Total"),
                output(func(Function::ToDouble, vec![col("Qty")])),
            ],
            ..statement("Orders", "N0")
        }
    }

    #[test]
    fn columns_follow_output_aliases() {
        let columns = Materializer::for_statement(&orders())
            .columns()
            .iter()
            .map(|c| (c.alias.clone(), c.column_type))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                ("N0_Qty".to_string(), ColumnType::Int32),
                ("N0_Price".to_string(), ColumnType::Decimal),
                ("Total".to_string(), ColumnType::Int32),
                ("PrP3".to_string(), ColumnType::Double),
            ],
            columns
        );
    }

    #[test]
    fn rows_are_in_operand_order() {
        let rows = Materializer::for_statement(&orders()).materialize(&[doc! {
            "PrP3": 4,
            "Total": 2_i64,
            "N0_Price": "3.25",
            "N0_Qty": 4.0,
        }]);
        assert_eq!(
            vec![Row::new(vec![
                Value::Int32(4),
                Value::Decimal("3.25".parse().unwrap()),
                Value::Int32(2),
                Value::Double(4.0),
            ])],
            rows
        );
    }

    #[test]
    fn missing_fields_are_null() {
        let rows = Materializer::for_statement(&orders()).materialize(&[doc! {"N0_Qty": 1}]);
        assert_eq!(1, rows.len());
        assert_eq!(Value::Int32(1), rows[0][0]);
        assert!(rows[0].iter().skip(1).all(Value::is_null));
    }

    #[test]
    fn dotted_alias_reads_nested_documents() {
        let statement = Statement {
            operands: vec![output_as(typed_col("Name", ColumnType::String), "customer.name")],
            ..statement("Orders", "N0")
        };
        let materializer = Materializer {
            columns: vec![ColumnDescriptor {
                alias: "customer.name".to_string(),
                column_type: ColumnType::String,
            }],
        };
        let document = doc! {"customer": {"name": "Ada"}};
        assert_eq!(
            Row::new(vec![Value::String("Ada".to_string())]),
            materializer.materialize_row(&document)
        );
        // Output aliases are sanitized, so the statement itself never reads a path.
        assert_eq!(
            Value::Null,
            Materializer::for_statement(&statement).materialize_row(&document)[0]
        );
    }

    #[test]
    fn no_documents_no_rows() {
        assert!(Materializer::for_statement(&orders()).materialize(&[]).is_empty());
    }
}
